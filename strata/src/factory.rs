use std::env;

#[cfg(all(feature = "mem", feature = "remote"))]
use std::sync::Arc;
#[cfg(all(feature = "mem", feature = "remote"))]
use strata_core::query::Datastore;
#[cfg(all(feature = "mem", feature = "remote"))]
use strata_remote::BackendClient;

/// Which backend construction selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Remote,
    Memory,
}

impl BackendKind {
    /// Read the `STRATA_BACKEND` flag, loading `.env` first: `memory`
    /// selects the in-memory backend, anything else (including unset) the
    /// remote one.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        match env::var("STRATA_BACKEND") {
            Ok(value) if value.eq_ignore_ascii_case("memory") => BackendKind::Memory,
            _ => BackendKind::Remote,
        }
    }
}

#[derive(Debug)]
pub enum FactoryError {
    /// The remote backend was selected but no client was injected.
    MissingClient,
}

impl std::fmt::Display for FactoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactoryError::MissingClient => {
                write!(f, "remote backend selected but no client was provided")
            }
        }
    }
}

impl std::error::Error for FactoryError {}

/// Build the datastore for `kind`.
///
/// Tests that need to seed or inspect data construct a
/// [`strata_mem::MemoryBackend`] directly and keep the handle; this factory
/// is the app-startup wiring where only the [`Datastore`] matters.
#[cfg(all(feature = "mem", feature = "remote"))]
pub fn datastore_for(
    kind: BackendKind,
    client: Option<Arc<dyn BackendClient>>,
) -> Result<Datastore, FactoryError> {
    let store = match kind {
        BackendKind::Memory => strata_mem::MemoryBackend::new().datastore(),
        BackendKind::Remote => {
            let client = client.ok_or(FactoryError::MissingClient)?;
            strata_remote::RemoteBackend::datastore(client)
        }
    };
    tracing::info!(backend = ?kind, "selected datastore backend");
    Ok(store)
}

/// [`datastore_for`] with the kind read from the environment.
#[cfg(all(feature = "mem", feature = "remote"))]
pub fn datastore_from_env(
    client: Option<Arc<dyn BackendClient>>,
) -> Result<Datastore, FactoryError> {
    datastore_for(BackendKind::from_env(), client)
}
