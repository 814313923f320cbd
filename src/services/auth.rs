use crate::errors::AppError;
use crate::gateway::Gateway;
use crate::models::{Identity, PasswordChange, Registration};

/// Sign-up, sign-in and account security. Form checks run before any request.
#[derive(Clone)]
pub struct AuthService {
    gateway: Gateway,
}

impl AuthService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn sign_up(&self, form: &Registration) -> Result<Identity, AppError> {
        form.validate()?;

        let full_name = Some(form.full_name.trim()).filter(|name| !name.is_empty());
        let user = self
            .gateway
            .sign_up(form.email.trim(), &form.password, full_name)
            .await?;
        tracing::info!("Signed up {}", user.id);
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AppError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Email and password are required".to_string(),
            ));
        }
        self.gateway.sign_in(email.trim(), password).await
    }

    pub async fn sign_out(&self) -> Result<(), AppError> {
        self.gateway.sign_out().await
    }

    pub async fn current_user(&self) -> Option<Identity> {
        self.gateway.current_user().await
    }

    pub async fn change_password(&self, form: &PasswordChange) -> Result<(), AppError> {
        form.validate()?;
        self.gateway.update_password(&form.new_password).await?;
        tracing::info!("Password changed");
        Ok(())
    }
}
