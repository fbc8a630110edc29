use rand::{rngs::SmallRng, SeedableRng};

/// Whether stochastic regularization is active for a forward pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Training,
    Evaluation,
}

/// Per-pass state threaded through every forward call.
///
/// Holds the mode flag and the random source used by dropout. Each concurrent
/// forward pass owns its own context; the model itself is only read.
#[derive(Debug)]
pub struct ForwardContext {
    mode: Mode,
    rng: SmallRng,
}

impl ForwardContext {
    /// Dropout disabled. The rng is never drawn from in this mode.
    pub fn evaluation() -> Self {
        Self {
            mode: Mode::Evaluation,
            rng: SmallRng::seed_from_u64(0),
        }
    }

    /// Dropout enabled, optionally with a fixed seed for reproducible masks
    pub fn training(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            mode: Mode::Training,
            rng,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_training(&self) -> bool {
        self.mode == Mode::Training
    }

    pub(crate) fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}

impl Default for ForwardContext {
    fn default() -> Self {
        Self::evaluation()
    }
}
