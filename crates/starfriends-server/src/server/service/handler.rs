//! Unary film catalogue.
//!
//! Every RPC performs exactly one store operation. A failed lookup is terminal
//! for the call; nothing is retried.

use crate::server::{metadata::CallContext, store::FilmStore};
use starfriends_core::{
    Error,
    proto::{
        CreateFilmRequest, CreateFilmResponse, DeleteFilmRequest, Film, GetFilmRequest,
        GetFilmResponse, ListFilmsRequest, ListFilmsResponse, UpdateFilmRequest,
        UpdateFilmResponse, starfriends_server::Starfriends,
    },
    types::FilmFields,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct FilmService {
    store: Arc<FilmStore>,
}

impl FilmService {
    pub fn new(store: Arc<FilmStore>) -> Self {
        Self { store }
    }
}

fn required_film(film: Option<Film>) -> starfriends_core::Result<Film> {
    film.ok_or_else(|| Error::invalid("film is required"))
}

#[tonic::async_trait]
impl Starfriends for FilmService {
    #[tracing::instrument(skip_all, fields(id = %request.get_ref().id))]
    async fn get_film(
        &self,
        request: Request<GetFilmRequest>,
    ) -> Result<Response<GetFilmResponse>, Status> {
        let ctx = CallContext::new("GetFilm", &request);
        let result = self.store.get(&request.get_ref().id).map(|film| GetFilmResponse {
            film: Some(film.into()),
        });
        ctx.complete(result)
    }

    #[tracing::instrument(skip_all)]
    async fn list_films(
        &self,
        request: Request<ListFilmsRequest>,
    ) -> Result<Response<ListFilmsResponse>, Status> {
        let ctx = CallContext::new("ListFilms", &request);
        let films = self.store.list().into_iter().map(Into::into).collect();
        ctx.complete(Ok(ListFilmsResponse { films }))
    }

    #[tracing::instrument(skip_all)]
    async fn create_film(
        &self,
        request: Request<CreateFilmRequest>,
    ) -> Result<Response<CreateFilmResponse>, Status> {
        let ctx = CallContext::new("CreateFilm", &request);
        let result = required_film(request.into_inner().film)
            .and_then(FilmFields::try_from)
            .and_then(|fields| self.store.create(fields))
            .map(|film| {
                tracing::debug!(id = %film.id, "film created");
                CreateFilmResponse {
                    film: Some(film.into()),
                }
            });
        ctx.complete(result)
    }

    #[tracing::instrument(skip_all)]
    async fn update_film(
        &self,
        request: Request<UpdateFilmRequest>,
    ) -> Result<Response<UpdateFilmResponse>, Status> {
        let ctx = CallContext::new("UpdateFilm", &request);
        let result = required_film(request.into_inner().film).and_then(|film| {
            let id = film.id.clone();
            let fields = FilmFields::try_from(film)?;
            self.store.update(&id, fields)
        });
        ctx.complete(result.map(|film| UpdateFilmResponse {
            film: Some(film.into()),
        }))
    }

    #[tracing::instrument(skip_all, fields(id = %request.get_ref().id))]
    async fn delete_film(
        &self,
        request: Request<DeleteFilmRequest>,
    ) -> Result<Response<()>, Status> {
        let ctx = CallContext::new("DeleteFilm", &request);
        let result = self.store.delete(&request.get_ref().id);
        ctx.complete(result)
    }
}
