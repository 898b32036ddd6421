//! Permission enforcement on verified claims.

use crate::auth::claims::ClaimSet;
use crate::auth::error::{AuthErrorKind, AuthorizationError};

/// Permission strings guarding the drink routes.
pub const GET_DRINKS_DETAIL: &str = "get:drinks-detail";
pub const POST_DRINKS: &str = "post:drinks";
pub const PATCH_DRINKS: &str = "patch:drinks";
pub const DELETE_DRINKS: &str = "delete:drinks";

/// Check that `claims` grant `permission`.
///
/// An empty permission only requires a verified token. A token without a
/// `permissions` claim is reported differently from one whose permissions
/// simply do not include the requested one.
pub fn enforce(permission: &str, claims: ClaimSet) -> Result<ClaimSet, AuthorizationError> {
    if permission.is_empty() {
        return Ok(claims);
    }

    let Some(permissions) = claims.permissions() else {
        return Err(AuthorizationError::new(
            AuthErrorKind::PermissionsClaimMissing,
        ));
    };

    if !permissions.contains(permission) {
        return Err(AuthorizationError::new(AuthErrorKind::PermissionDenied));
    }

    Ok(claims)
}
