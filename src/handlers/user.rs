use actix_web::http::StatusCode;
use actix_web::web::{Data, Json, Path};
use actix_web::HttpResponse;
use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::{query, query_as, query_scalar, PgPool};
use uuid::Uuid;

use crate::context::UserInfo;
use crate::error::{unique_violation, Error};
use crate::hex::ToHex;
use crate::middlewares::jwt::{Claim, JWT_SECRET};
use crate::models::user::{Profile, ProfileUpdate, User};
use crate::response::CreateResponse;
use crate::serde::{Deserialize, Serialize};
use crate::sha2::{Digest, Sha256};
use crate::tokener::{Tokener, JWT};

pub fn hash_password(pass: &str, slt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pass);
    hasher.update(slt);
    hasher.finalize().encode_hex()
}

pub fn random_salt() -> String {
    let chars: Vec<char> = "1234567890abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ".chars().collect();
    let mut slt = String::new();
    let mut rng = rand::thread_rng();
    for _ in 0..32 {
        let i = rng.gen_range(0..chars.len());
        slt.push(chars[i]);
    }
    slt
}

const PROFILE_QUERY: &str = "
    SELECT u.id, u.email, u.username, u.name, u.avatar_url, u.bio, u.created_at,
        (SELECT COUNT(*) FROM polls WHERE created_by = u.id) AS total_polls,
        (SELECT COUNT(*) FROM votes WHERE user_id = u.id) AS total_votes
    FROM users AS u
    WHERE u.id = $1";

#[derive(Debug, Clone, Deserialize)]
pub struct Signup {
    pub email: String,
    pub username: String,
    pub name: String,
    pub password: String,
}

pub async fn signup(body: Json<Signup>, db: Data<PgPool>) -> Result<Json<CreateResponse>, Error> {
    if body.email.trim().is_empty() || !body.email.contains('@') {
        return Err(Error::BusinessError("invalid email".into()));
    }
    if body.username.trim().is_empty() {
        return Err(Error::BusinessError("username must not be empty".into()));
    }
    if body.name.trim().is_empty() {
        return Err(Error::BusinessError("name must not be empty".into()));
    }
    if body.password.len() < 8 {
        return Err(Error::BusinessError("password must be at least 8 characters".into()));
    }
    let slt = random_salt();
    let hashed = hash_password(&body.password, &slt);
    let mut conn = db.acquire().await?;
    let id: Uuid = query_scalar(
        "INSERT INTO users (email, username, name, password, salt)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id",
    )
    .bind(body.email.trim())
    .bind(body.username.trim())
    .bind(body.name.trim())
    .bind(&hashed)
    .bind(&slt)
    .fetch_one(&mut conn)
    .await
    .map_err(|e| unique_violation(e, "email or username already taken"))?;
    Ok(Json(CreateResponse { id }))
}

#[derive(Debug, Deserialize)]
pub struct Login {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: Profile,
}

pub async fn login(body: Json<Login>, db: Data<PgPool>) -> Result<Json<LoginResponse>, Error> {
    let mut conn = db.acquire().await?;
    let user: User = query_as("SELECT * FROM users WHERE email = $1 OR username = $1")
        .bind(&body.username)
        .fetch_optional(&mut conn)
        .await?
        .ok_or_else(|| Error::Unauthorized("invalid credentials".into()))?;
    if hash_password(&body.password, &user.salt) != user.password {
        return Err(Error::Unauthorized("invalid credentials".into()));
    }
    let secret = dotenv::var(JWT_SECRET)?;
    let tokener = JWT::new(secret.into_bytes());
    let token = tokener.gen_token(&Claim {
        sub: user.id.to_string(),
        exp: (Utc::now() + Duration::days(7)).timestamp(),
    })?;
    let user: Profile = query_as(PROFILE_QUERY).bind(user.id).fetch_one(&mut conn).await?;
    Ok(Json(LoginResponse { token, user }))
}

pub async fn me(user_info: UserInfo, db: Data<PgPool>) -> Result<Json<Profile>, Error> {
    let mut conn = db.acquire().await?;
    let profile: Profile = query_as(PROFILE_QUERY).bind(user_info.id).fetch_optional(&mut conn).await?.ok_or(Error::UserNotFound)?;
    Ok(Json(profile))
}

pub async fn update_me(user_info: UserInfo, body: Json<ProfileUpdate>, db: Data<PgPool>) -> Result<Json<Profile>, Error> {
    if body.name.trim().is_empty() || body.username.trim().is_empty() {
        return Err(Error::BusinessError("name and username must not be empty".into()));
    }
    let mut conn = db.acquire().await?;
    query(
        "UPDATE users SET name = $1, username = $2, avatar_url = $3, bio = $4, updated_at = now()
        WHERE id = $5",
    )
    .bind(body.name.trim())
    .bind(body.username.trim())
    .bind(&body.avatar_url)
    .bind(&body.bio)
    .bind(user_info.id)
    .execute(&mut conn)
    .await
    .map_err(|e| unique_violation(e, "username already taken"))?;
    let profile: Profile = query_as(PROFILE_QUERY).bind(user_info.id).fetch_one(&mut conn).await?;
    Ok(Json(profile))
}

pub async fn profile(path: Path<(Uuid,)>, db: Data<PgPool>) -> Result<Json<Profile>, Error> {
    let (user_id,) = path.into_inner();
    let mut conn = db.acquire().await?;
    let profile: Profile = query_as(PROFILE_QUERY).bind(user_id).fetch_optional(&mut conn).await?.ok_or(Error::UserNotFound)?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

// Always answers 200 so the endpoint cannot be used to probe which emails
// have accounts. The token is logged in lieu of a mailer.
pub async fn request_password_reset(body: Json<ResetRequest>, db: Data<PgPool>) -> Result<HttpResponse, Error> {
    let mut conn = db.acquire().await?;
    let user_id: Option<Uuid> = query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&body.email)
        .fetch_optional(&mut conn)
        .await?;
    if let Some(uid) = user_id {
        let token: Uuid = query_scalar(
            "INSERT INTO password_resets (user_id, expires_at) VALUES ($1, $2) RETURNING token",
        )
        .bind(uid)
        .bind(Utc::now() + Duration::hours(1))
        .fetch_one(&mut conn)
        .await?;
        log::info!("password reset token for {}: {}", body.email, token);
    }
    Ok(HttpResponse::build(StatusCode::OK).finish())
}

#[derive(Debug, Deserialize)]
pub struct ResetApply {
    pub password: String,
}

pub async fn apply_password_reset(path: Path<(Uuid,)>, body: Json<ResetApply>, db: Data<PgPool>) -> Result<HttpResponse, Error> {
    let (token,) = path.into_inner();
    if body.password.len() < 8 {
        return Err(Error::BusinessError("password must be at least 8 characters".into()));
    }
    let mut tx = db.begin().await?;
    let user_id: Option<Uuid> = query_scalar(
        "SELECT user_id FROM password_resets WHERE token = $1 AND expires_at > now() FOR UPDATE",
    )
    .bind(token)
    .fetch_optional(&mut tx)
    .await?;
    let user_id = user_id.ok_or_else(|| Error::BusinessError("invalid or expired reset token".into()))?;
    query("DELETE FROM password_resets WHERE token = $1").bind(token).execute(&mut tx).await?;
    let slt = random_salt();
    let hashed = hash_password(&body.password, &slt);
    query("UPDATE users SET password = $1, salt = $2, updated_at = now() WHERE id = $3")
        .bind(&hashed)
        .bind(&slt)
        .bind(user_id)
        .execute(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(HttpResponse::build(StatusCode::OK).finish())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hash_password_deterministic() {
        let slt = "abcdefgh";
        assert_eq!(hash_password("hunter22", slt), hash_password("hunter22", slt));
    }

    #[test]
    fn test_hash_password_salt_matters() {
        assert_ne!(hash_password("hunter22", "salt-a"), hash_password("hunter22", "salt-b"));
    }

    #[test]
    fn test_hash_password_is_hex_sha256() {
        let h = hash_password("hunter22", "salt");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_random_salt_shape() {
        let a = random_salt();
        let b = random_salt();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
