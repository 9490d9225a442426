use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewshedError {
    #[error("calculation cancelled")]
    Cancelled,

    #[error("calculation thread panicked")]
    Panicked,
}
