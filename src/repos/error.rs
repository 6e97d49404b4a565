use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("record store lock poisoned")]
    Poisoned,
}
