use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use shared_utils::jwt::TokenService;
use shared_utils::password::verify_password;
use staff_cell::{StaffMember, StaffService};

use crate::models::{AuthError, LoginRequest, LoginResponse, SessionUser};

pub struct AuthService {
    staff: StaffService,
    tokens: Arc<TokenService>,
}

impl AuthService {
    pub fn new(staff: StaffService, tokens: Arc<TokenService>) -> Self {
        Self { staff, tokens }
    }

    /// Exchanges credentials for a signed token. Unknown emails and wrong
    /// passwords produce the same error.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AuthError> {
        let member = self
            .staff
            .find_by_email(&request.email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let password_ok = verify_password(&request.password, &member.password_hash).unwrap_or_else(|e| {
            warn!("Stored password hash for {} is unreadable: {}", member.id, e);
            false
        });
        if !password_ok {
            debug!("Password mismatch for {}", member.id);
            return Err(AuthError::InvalidCredentials);
        }
        if !member.is_active {
            return Err(AuthError::AccountDisabled);
        }

        let token = self.tokens.issue(member.id, member.role, Some(&member.email))?;
        info!("Staff member {} logged in", member.id);

        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.ttl().num_seconds(),
            user: session_user(member),
        })
    }
}

fn session_user(member: StaffMember) -> SessionUser {
    SessionUser {
        id: member.id,
        name: member.full_name(),
        email: member.email,
        role: member.role,
    }
}
