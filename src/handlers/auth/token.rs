use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app_check::AppCheckToken;
use crate::auth::{JwtTokenService, TokenPayload};
use crate::backend::Backend;
use crate::error::ApiError;
use crate::handlers::user::USERS_COLLECTION;
use crate::schema::{ErrorTree, Validate};
use crate::types::User;
use crate::wrapper::{http_handler, Endpoint, HandlerConfig, Reply, RequestContext};

use super::super::{cors_policy, Services};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenBody {
    pub firestore_id: String,
}

impl Validate for IssueTokenBody {
    fn validate(&self) -> Result<(), ErrorTree> {
        let mut errors = ErrorTree::new();
        if self.firestore_id.is_empty() || self.firestore_id.contains('/') {
            errors.push(&["firestoreId"], "Invalid document id");
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    /// Seconds until the token expires.
    pub expires_in: i64,
}

impl Validate for IssuedToken {
    fn validate(&self) -> Result<(), ErrorTree> {
        let mut errors = ErrorTree::new();
        if self.token.is_empty() {
            errors.push(&["token"], "token must not be empty");
        }
        if self.expires_in <= 0 {
            errors.push(&["expiresIn"], "expiresIn must be positive");
        }
        errors.into_result()
    }
}

pub async fn issue_token_handler(
    tokens: Arc<JwtTokenService>,
    ctx: RequestContext<IssueTokenBody, Value, AppCheckToken>,
) -> anyhow::Result<Reply<IssuedToken>> {
    let firestore_id = ctx.body.firestore_id;
    let documents = Backend::instance().documents();

    let Some(document) = documents.get(USERS_COLLECTION, &firestore_id).await? else {
        return Err(ApiError::not_found("User not found").into());
    };
    let user: User = serde_json::from_value(document)?;

    let (Some(email), Some(sql_id)) = (user.email, user.sql_id) else {
        ctx.logger.warn("User is not provisioned", json!({ "firestoreId": &firestore_id }));
        return Err(ApiError::conflict("User account is not provisioned").into());
    };

    let payload = TokenPayload {
        email,
        firestore_id,
        sql_id,
    };
    let token = match tokens.issue(&payload) {
        Ok(token) => token,
        Err(err) => {
            ctx.logger.error("Token issuing failed", json!({ "err": err.to_string() }));
            return Err(ApiError::internal_server_error("Unable to issue token").into());
        }
    };

    ctx.logger.info("Token issued", json!({ "firestoreId": &payload.firestore_id, "appId": &ctx.app_check.app_id }));
    Ok(Reply::ok(IssuedToken {
        token,
        expires_in: tokens.expiry().num_seconds(),
    }))
}

/// POST /issueToken - exchange a provisioned user id for a bearer token
pub fn issue_token(services: &Services) -> Endpoint {
    let tokens = Arc::clone(&services.tokens);
    http_handler(
        move |ctx: RequestContext<IssueTokenBody, Value, AppCheckToken>| issue_token_handler(Arc::clone(&tokens), ctx),
        HandlerConfig::new()
            .app_check(services.app_check.clone())
            .body_type::<IssueTokenBody>()
            .response_type::<IssuedToken>()
            .function_name("issueToken")
            .cors(cors_policy()),
    )
}
