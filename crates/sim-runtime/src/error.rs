#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("scenario error: {0}")]
    Scenario(String),

    #[error("simulation error: {0}")]
    Sim(#[from] sandbox_sim::SimError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
