use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::app_check::AppCheckToken;
use crate::logger::get_logger;
use crate::schema::{is_email, ErrorTree, Validate};
use crate::wrapper::{http_handler, Endpoint, HandlerConfig, Reply, RequestContext};

use super::super::{cors_policy, Services};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteUserBody {
    pub email: String,
}

impl Validate for InviteUserBody {
    fn validate(&self) -> Result<(), ErrorTree> {
        let mut errors = ErrorTree::new();
        if !is_email(&self.email) {
            errors.push(&["email"], "Invalid email address");
        }
        errors.into_result()
    }
}

pub async fn invite_user_handler(
    ctx: RequestContext<InviteUserBody, Value, AppCheckToken>,
) -> anyhow::Result<Reply<Value>> {
    let logger = get_logger();
    logger.info(
        "inviteUserHandler: begin",
        json!({ "body": &ctx.body, "appId": &ctx.app_check.app_id }),
    );
    Ok(Reply::status(StatusCode::OK))
}

/// POST /inviteUser - attested clients only
pub fn invite_user(services: &Services) -> Endpoint {
    http_handler(
        invite_user_handler,
        HandlerConfig::new()
            .app_check(services.app_check.clone())
            .body_type::<InviteUserBody>()
            .function_name("inviteUser")
            .cors(cors_policy()),
    )
}
