//! # Film Records
//!
//! The catalogue stores [`Film`]s: an immutable server-generated ID plus a
//! fixed set of descriptive [`FilmFields`]. Updates replace the fields as a
//! whole and never touch the ID.
//!
//! Conversions to and from the protobuf [`proto::Film`] live here so servers
//! and clients agree on how a missing or out-of-range `release_date` is
//! treated: it is an [`Error::InvalidArgument`], never a panic.

use crate::{Error, Result, proto};
use prost_types::Timestamp;
use std::time::SystemTime;

/// Descriptive fields of a film. Everything but the ID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilmFields {
    pub title: String,
    pub director: String,
    pub producer: String,
    pub release_date: SystemTime,
}

/// A stored film.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Film {
    pub id: String,
    pub fields: FilmFields,
}

impl From<Film> for proto::Film {
    fn from(film: Film) -> Self {
        let FilmFields {
            title,
            director,
            producer,
            release_date,
        } = film.fields;

        Self {
            id: film.id,
            title,
            director,
            producer,
            release_date: Some(Timestamp::from(release_date)),
        }
    }
}

impl TryFrom<proto::Film> for FilmFields {
    type Error = Error;

    /// Extracts the descriptive fields, ignoring the ID.
    fn try_from(film: proto::Film) -> Result<Self> {
        let timestamp = film
            .release_date
            .ok_or_else(|| Error::invalid("film.release_date is required"))?;
        let release_date = SystemTime::try_from(timestamp)
            .map_err(|e| Error::invalid(format!("film.release_date is invalid: {e}")))?;

        Ok(Self {
            title: film.title,
            director: film.director,
            producer: film.producer,
            release_date,
        })
    }
}
