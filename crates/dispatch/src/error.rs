//! The dispatcher owns no failure modes of its own; everything it can
//! return comes from the stores or the channel it delivers through.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Conversations(#[from] attendo_conversations::Error),

    #[error(transparent)]
    Directory(#[from] attendo_directory::Error),

    #[error(transparent)]
    Channel(#[from] attendo_channels::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
