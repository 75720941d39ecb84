use crate::error::Error;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub trait Payload: Serialize + for<'d> Deserialize<'d> {
    fn user(&self) -> &str;
}

pub trait Tokener<P: Payload> {
    fn gen_token(&self, payload: &P) -> Result<String, Error>;
    fn verify_token(&self, token: &str) -> Result<P, Error>;
}

pub struct JWT {
    secret: Vec<u8>,
}

impl JWT {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }
}

impl<P> Tokener<P> for JWT
where
    P: Payload,
{
    fn gen_token(&self, payload: &P) -> Result<String, Error> {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(&self.secret);
        let token = encode(&header, payload, &key)?;
        Ok(token)
    }
    fn verify_token(&self, token: &str) -> Result<P, Error> {
        let key = DecodingKey::from_secret(&self.secret);
        let validation = Validation::new(Algorithm::HS256);
        let payload = decode(token, &key, &validation)?;
        Ok(payload.claims)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Deserialize, Serialize)]
    struct Claim {
        user: String,
        exp: i64,
    }

    impl Payload for Claim {
        fn user(&self) -> &str {
            &self.user
        }
    }

    #[test]
    fn test_gen_and_verify_token() {
        let jwt = JWT::new(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0]);
        let claim = Claim {
            user: "bear dad".into(),
            exp: chrono::offset::Utc::now().timestamp() + 3600,
        };
        let token = jwt.gen_token(&claim).unwrap();
        let c: Claim = jwt.verify_token(&token).unwrap();
        assert_eq!(claim.user, c.user);
    }

    #[test]
    fn test_expired_token() {
        let jwt = JWT::new(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0]);
        let claim = Claim {
            user: "bear dad".into(),
            exp: chrono::offset::Utc::now().timestamp() - 3600,
        };
        let token = jwt.gen_token(&claim).unwrap();
        assert!(<JWT as Tokener<Claim>>::verify_token(&jwt, &token).is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let jwt = JWT::new(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0]);
        let other = JWT::new(vec![9, 9, 9, 9]);
        let claim = Claim {
            user: "bear dad".into(),
            exp: chrono::offset::Utc::now().timestamp() + 3600,
        };
        let token = jwt.gen_token(&claim).unwrap();
        assert!(<JWT as Tokener<Claim>>::verify_token(&other, &token).is_err());
    }
}
