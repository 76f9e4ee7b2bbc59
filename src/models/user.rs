use serde::{Deserialize, Serialize};

/// JWT claims issued by the AquaBeacon auth service. This service only
/// validates them; it never mints tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id (owner of any payment created under this token).
    pub sub: String,
    pub name: String,
    /// Profile phone number, used to pre-fill the checkout form.
    pub phone: String,
    pub exp: usize,
}
