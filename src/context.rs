use crate::actix_web::{self, Error, HttpMessage};
use crate::uuid::Uuid;
use std::future::{ready, Ready};

#[derive(Debug, Clone)]
pub struct UserInfo {
    pub id: Uuid,
}

impl actix_web::FromRequest for UserInfo {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;
    fn from_request(req: &actix_web::HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        if let Some(user) = req.extensions().get::<Self>() {
            ready(Ok(user.clone()))
        } else {
            ready(Err(actix_web::error::ErrorUnauthorized("")))
        }
    }
}
