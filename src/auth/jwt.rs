use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiry: Duration::minutes(config.jwt_expiry_minutes),
        })
    }

    pub fn generate_token(&self, user_id: Uuid, username: &str, role: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.expiry;
        let claims = Claims {
            sub: user_id,
            username: username.to_owned(),
            role: role.to_owned(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::JwtService;
    use crate::config::AppConfig;
    use uuid::Uuid;

    fn config(secret: &str) -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/jobdb".to_string(),
            database_max_pool_size: 1,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: secret.to_string(),
            jwt_issuer: "jobdb-test".to_string(),
            jwt_audience: "jobdb-test-clients".to_string(),
            jwt_expiry_minutes: 5,
            cors_allowed_origin: None,
            url_check_timeout_secs: 3,
            url_check_delay_ms: 0,
        }
    }

    #[test]
    fn issued_tokens_verify_with_same_secret() {
        let service = JwtService::from_config(&config("one")).expect("jwt service");
        let user_id = Uuid::new_v4();
        let token = service
            .generate_token(user_id, "luke", "user")
            .expect("token");
        let claims = service.verify_token(&token).expect("claims");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.username, "luke");
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let issuer = JwtService::from_config(&config("one")).expect("jwt service");
        let verifier = JwtService::from_config(&config("two")).expect("jwt service");
        let token = issuer
            .generate_token(Uuid::new_v4(), "vader", "admin")
            .expect("token");
        assert!(verifier.verify_token(&token).is_err());
    }
}
