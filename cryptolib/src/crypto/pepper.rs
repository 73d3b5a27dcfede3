//! The pepper: a deployment-wide secret mixed into every hash.
//!
//! Unlike a salt it is never stored next to the data. Rotating it is a
//! deliberate global invalidation: every hash and derived key issued under the
//! previous value stops verifying.

use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use thiserror::Error;
use zeroize::Zeroizing;

/// Pepper in effect until configuration installs a deployment-specific one.
const BUILTIN_PEPPER: &str = "q]7Lw#Zr2%Vx!e9M@tY^d4Hk*N8p(Sg)cJ~b6Fo+Rz;U3a=Wn_Ei$Tl0Cy.Km5Qv";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PepperError {
    #[error("invalid pepper: the pepper must be a non-empty string")]
    InvalidPepper,
}

/// Single-writer, many-reader cell holding a pepper value.
pub struct Pepper {
    value: RwLock<Zeroizing<String>>,
}

impl Pepper {
    pub fn new(value: impl Into<String>) -> Result<Self, PepperError> {
        let value = Zeroizing::new(value.into());
        if value.is_empty() {
            return Err(PepperError::InvalidPepper);
        }
        Ok(Self {
            value: RwLock::new(value),
        })
    }

    /// Takes a consistent snapshot of the current pepper.
    ///
    /// Derivations call this once and work from the copy, so a concurrent
    /// [`Pepper::set`] can never be observed halfway through a hash.
    pub fn get(&self) -> Zeroizing<String> {
        let guard = self.value.read().unwrap_or_else(PoisonError::into_inner);
        Zeroizing::new(guard.as_str().to_owned())
    }

    /// Replaces the pepper.
    pub fn set(&self, value: impl Into<String>) -> Result<(), PepperError> {
        let value = Zeroizing::new(value.into());
        if value.is_empty() {
            return Err(PepperError::InvalidPepper);
        }
        let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
        *guard = value;
        tracing::info!("pepper rotated; hashes issued under the previous pepper no longer verify");
        Ok(())
    }

    pub fn is_builtin(&self) -> bool {
        self.get().as_str() == BUILTIN_PEPPER
    }
}

impl std::fmt::Debug for Pepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pepper")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

static GLOBAL_PEPPER: Lazy<Arc<Pepper>> = Lazy::new(|| {
    Arc::new(Pepper {
        value: RwLock::new(Zeroizing::new(BUILTIN_PEPPER.to_owned())),
    })
});

/// Handle to the process-wide pepper.
pub fn global() -> Arc<Pepper> {
    Arc::clone(&GLOBAL_PEPPER)
}

pub fn get_pepper() -> Zeroizing<String> {
    GLOBAL_PEPPER.get()
}

/// Rotates the process-wide pepper.
pub fn set_pepper(value: impl Into<String>) -> Result<(), PepperError> {
    GLOBAL_PEPPER.set(value)
}
