use axum::http::{HeaderMap, StatusCode, header};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::web::AppState;

/// Authenticated company resolved from an API token.
#[derive(Clone, sqlx::FromRow)]
pub struct AuthCompany {
    pub id: Uuid,
    pub name: String,
}

/// Error surface for JSON API handlers.
pub struct JsonAuthError {
    pub status: StatusCode,
    pub message: String,
}

impl JsonAuthError {
    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

/// Resolve the calling company from a `Authorization: Bearer <token>` header.
pub async fn authenticate_company(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthCompany, JsonAuthError> {
    let token = bearer_token(headers)
        .ok_or_else(|| JsonAuthError::unauthorized("Missing or malformed Authorization header."))?;

    match fetch_company_by_token(state.pool_ref(), token).await {
        Ok(Some(company)) => Ok(company),
        Ok(None) => Err(JsonAuthError::unauthorized("Invalid API token.")),
        Err(err) => {
            error!(?err, "failed to resolve company from API token");
            Err(JsonAuthError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Authentication backend error.".to_string(),
            })
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<Uuid> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    Uuid::parse_str(token).ok()
}

async fn fetch_company_by_token(pool: &PgPool, token: Uuid) -> anyhow::Result<Option<AuthCompany>> {
    let company = sqlx::query_as::<_, AuthCompany>(
        "SELECT id, name FROM companies WHERE api_token = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(company)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_parses_well_formed_header() {
        let token = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );

        assert_eq!(bearer_token(&headers), Some(token));
    }

    #[test]
    fn bearer_token_rejects_missing_scheme_and_bad_uuid() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer not-a-uuid".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
