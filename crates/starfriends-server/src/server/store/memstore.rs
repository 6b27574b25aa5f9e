//! Mutex-guarded film table.
//!
//! Every operation takes the same lock for its whole duration, so no caller
//! can observe a half-applied create, update or delete, and two concurrent
//! creates can never lose one another. The lock is never held across an
//! `.await`; callers are async handlers but the critical sections are short
//! and purely in-memory.

use super::{IdSource, UlidSource};
use core::time::Duration;
use parking_lot::Mutex;
use starfriends_core::{
    Error, Result,
    types::{Film, FilmFields},
};
use std::collections::{BTreeMap, HashSet};
use std::time::SystemTime;

/// Attempts at drawing an unused ID before a create gives up.
const MAX_ID_ATTEMPTS: usize = 8;

struct Table {
    films: BTreeMap<String, Film>,
    /// Every ID this store has handed out, deleted ones included.
    issued: HashSet<String>,
}

/// The shared film catalogue.
///
/// IDs are generated by the store, are unique, and are never reused for the
/// lifetime of the store, even after the film owning them has been deleted.
pub struct FilmStore {
    table: Mutex<Table>,
    ids: Box<dyn IdSource>,
}

impl Default for FilmStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FilmStore {
    /// Creates an empty store that issues ULIDs.
    pub fn new() -> Self {
        Self::with_id_source(UlidSource)
    }

    /// Creates an empty store drawing IDs from `ids`.
    pub fn with_id_source(ids: impl IdSource + 'static) -> Self {
        Self {
            table: Mutex::new(Table {
                films: BTreeMap::new(),
                issued: HashSet::new(),
            }),
            ids: Box::new(ids),
        }
    }

    /// Creates a store holding the original trilogy.
    pub fn with_default_films() -> Self {
        let store = Self::new();
        {
            let mut table = store.table.lock();
            for film in default_films() {
                table.issued.insert(film.id.clone());
                table.films.insert(film.id.clone(), film);
            }
        }
        store
    }

    /// Stores a new film under a freshly generated ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the ID source keeps producing IDs
    /// that were already issued.
    pub fn create(&self, fields: FilmFields) -> Result<Film> {
        let mut table = self.table.lock();
        let mut last = String::new();

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.ids.next_id();
            if !id.is_empty() && table.issued.insert(id.clone()) {
                let film = Film {
                    id: id.clone(),
                    fields,
                };
                table.films.insert(id, film.clone());
                return Ok(film);
            }

            tracing::warn!(%id, "generated film id collided, regenerating");
            last = id;
        }

        Err(Error::AlreadyExists { id: last })
    }

    /// Looks a film up by ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no film has this ID.
    pub fn get(&self, id: &str) -> Result<Film> {
        self.table
            .lock()
            .films
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound { id: id.to_owned() })
    }

    /// Returns a snapshot of every film, ordered by ID.
    pub fn list(&self) -> Vec<Film> {
        self.table.lock().films.values().cloned().collect()
    }

    /// Replaces every descriptive field of an existing film. The ID never
    /// changes.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `id` is empty, whatever the store holds.
    /// - [`Error::NotFound`] if no film has this ID.
    pub fn update(&self, id: &str, fields: FilmFields) -> Result<Film> {
        if id.is_empty() {
            return Err(Error::invalid("film.id must not be empty"));
        }

        let mut table = self.table.lock();
        let film = table
            .films
            .get_mut(id)
            .ok_or_else(|| Error::NotFound { id: id.to_owned() })?;
        film.fields = fields;
        Ok(film.clone())
    }

    /// Removes a film.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no film has this ID.
    pub fn delete(&self, id: &str) -> Result<()> {
        match self.table.lock().films.remove(id) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound { id: id.to_owned() }),
        }
    }
}

fn release(unix_secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(unix_secs)
}

fn default_films() -> [Film; 3] {
    [
        Film {
            id: "c849f921-5488-4750-b989-70ce002eb572".to_string(),
            fields: FilmFields {
                title: "A New Hope".to_string(),
                director: "George Lucas".to_string(),
                producer: "Gary Kurtz, Rick McCallum".to_string(),
                release_date: release(233_366_400), // 1977-05-25
            },
        },
        Film {
            id: "ff686c7d-2e09-4920-81e4-50e28731094c".to_string(),
            fields: FilmFields {
                title: "The Empire Strikes Back".to_string(),
                director: "Irvin Kershner".to_string(),
                producer: "Gary Kurtz, Rick McCallum".to_string(),
                release_date: release(327_369_600), // 1980-05-17
            },
        },
        Film {
            id: "35066997-1cb2-47d4-9ccf-d45d11f7c3ee".to_string(),
            fields: FilmFields {
                title: "Return of the Jedi".to_string(),
                director: "Richard Marquand".to_string(),
                producer: "Howard G. Kazanjian, George Lucas, Rick McCallum".to_string(),
                release_date: release(422_668_800), // 1983-05-25
            },
        },
    ]
}
