extern crate actix_web;
extern crate chrono;
extern crate dotenv;
extern crate env_logger;
extern crate hex;
extern crate jsonwebtoken;
extern crate log;
extern crate rand;
extern crate serde;
extern crate serde_json;
extern crate sha2;
extern crate sqlx;
extern crate thiserror;
extern crate tokio;
extern crate uuid;

mod context;
mod error;
mod handlers;
mod middlewares;
pub mod models;
pub mod response;
mod tokener;

use actix_web::web::{delete, get, post, put, resource, scope, Data};
use actix_web::HttpServer;
use middlewares::jwt::{JWTMiddleware, JWT_SECRET};
use sqlx::postgres::PgPoolOptions;

#[actix_web::main]
async fn main() -> Result<(), std::io::Error> {
    dotenv::dotenv().ok();
    std::env::set_var("RUST_LOG", "actix_web=info");
    env_logger::init();
    let database_url = dotenv::var("DATABASE_URL").expect("environment variable DATABASE_URL not been set");
    let jwt_secret = dotenv::var(JWT_SECRET).expect("environment variable JWT_SECRET not been set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("failed to connect to database");
    HttpServer::new(move || {
        actix_web::App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(Data::new(pool.clone()))
            .service(
                scope("")
                    .wrap(JWTMiddleware::new(jwt_secret.clone().into_bytes()))
                    .service(resource("signup").route(post().to(handlers::signup)))
                    .service(resource("login").route(post().to(handlers::login)))
                    .service(
                        scope("password_resets")
                            .route("", post().to(handlers::user::request_password_reset))
                            .route("{token}", put().to(handlers::user::apply_password_reset)),
                    )
                    .service(resource("stats").route(get().to(handlers::stats::summary)))
                    .service(
                        scope("me")
                            .route("", get().to(handlers::user::me))
                            .route("", put().to(handlers::user::update_me))
                            .route("votes", get().to(handlers::vote::my_votes)),
                    )
                    .service(
                        scope("users").service(
                            scope("{user_id}")
                                .route("", get().to(handlers::user::profile))
                                .route("stats", get().to(handlers::stats::user_stats)),
                        ),
                    )
                    .service(
                        scope("polls")
                            .route("", get().to(handlers::poll::list))
                            .route("", post().to(handlers::poll::create))
                            .service(
                                scope("{poll_id}")
                                    .route("", get().to(handlers::poll::detail))
                                    .route("", delete().to(handlers::poll::delete_poll))
                                    .route("close", post().to(handlers::poll::close))
                                    .route("stats", get().to(handlers::stats::poll_stats))
                                    .service(
                                        scope("votes")
                                            .route("", post().to(handlers::vote::create))
                                            .route("", delete().to(handlers::vote::retract)),
                                    ),
                            ),
                    ),
            )
    })
    .bind(("0.0.0.0", 8000))?
    .run()
    .await
}
