use serde_json::Value;

use crate::auth::TokenPayload;
use crate::wrapper::{http_handler, Endpoint, HandlerConfig, Reply, RequestContext};

use super::super::{cors_policy, Services};

pub async fn whoami_handler(ctx: RequestContext<Value, Value, (), TokenPayload>) -> anyhow::Result<Reply<TokenPayload>> {
    Ok(Reply::ok(ctx.token))
}

/// GET /whoami - identity carried by the caller's bearer token
pub fn whoami(services: &Services) -> Endpoint {
    http_handler(
        whoami_handler,
        HandlerConfig::new()
            .require_auth_token(services.tokens.clone())
            .response_type::<TokenPayload>()
            .function_name("whoami")
            .cors(cors_policy()),
    )
}
