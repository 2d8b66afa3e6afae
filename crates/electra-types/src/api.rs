use serde::Deserialize;

use crate::{PollDuration, UnknownDuration};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be blank")]
    Blank(&'static str),
    #[error("email address is malformed")]
    MalformedEmail,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error(transparent)]
    Duration(#[from] UnknownDuration),
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Blank(field));
    }
    Ok(())
}

// -- Auth --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("first name", &self.first_name)?;
        require("last name", &self.last_name)?;
        require("email", &self.email)?;
        require("password", &self.password)?;

        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(ValidationError::MalformedEmail),
        }

        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("email", &self.email)?;
        require("password", &self.password)
    }
}

// -- Polls --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePollRequest {
    pub voting_code: String,
    pub duration: String,
}

impl CreatePollRequest {
    pub fn duration(&self) -> Result<PollDuration, ValidationError> {
        require("voting code", &self.voting_code)?;
        Ok(self.duration.parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewCandidate {
    pub name: String,
    pub position: String,
    pub manifesto: String,
}

impl NewCandidate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        require("position", &self.position)?;
        require("manifesto", &self.manifesto)
    }
}
