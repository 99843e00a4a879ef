use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("No token available for scopes: {}", scopes.join(" "))]
    TokenUnavailable { scopes: Vec<String> },

    #[error("Token provider failed: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
