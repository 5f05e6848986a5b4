pub mod events;
pub mod weather;

use parking_lot::Mutex;
use std::sync::Arc;

use crate::{
    cache::ResponseCache,
    config::Config,
    fetcher::ApiClient,
    providers::{CoverArtClient, LookupCoordinator},
    storage::EventStore,
};

/// Deduplicador de envíos: recuerda la huella del último envío aceptado
/// en el proceso. No es durable; se reinicia con el servicio.
#[derive(Default)]
pub struct SubmissionGuard {
    last: Mutex<Option<String>>,
}

impl SubmissionGuard {
    /// Marca la huella como la última aceptada. Devuelve `false` si es
    /// idéntica a la anterior (duplicado inmediato). El chequeo y la
    /// escritura ocurren bajo el mismo lock, así que envíos rápidos en
    /// paralelo también se deduplican.
    pub fn mark(&self, fingerprint: &str) -> bool {
        let mut last = self.last.lock();
        if last.as_deref() == Some(fingerprint) {
            return false;
        }
        *last = Some(fingerprint.to_string());
        true
    }
}

/// Estado compartido del servicio, construido una vez en el arranque y
/// pasado por `Arc` a cada handler.
pub struct AppContext {
    pub config: Config,
    pub cache: ResponseCache,
    pub client: Arc<ApiClient>,
    pub coordinator: LookupCoordinator,
    pub coverart: CoverArtClient,
    pub store: EventStore,
    pub dedup: SubmissionGuard,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_submission_is_accepted() {
        let guard = SubmissionGuard::default();
        assert_eq!(guard.mark("a-b-c-false"), true);
    }

    #[test]
    fn test_identical_fingerprint_is_duplicate() {
        let guard = SubmissionGuard::default();
        assert!(guard.mark("a-b-c-false"));
        assert!(!guard.mark("a-b-c-false"));
        // sigue siendo duplicado hasta que cambie la huella
        assert!(!guard.mark("a-b-c-false"));
    }

    #[test]
    fn test_changed_fingerprint_is_accepted() {
        let guard = SubmissionGuard::default();
        assert!(guard.mark("a-b-c-false"));
        assert!(guard.mark("a-b-c-true"));
        // volver a la huella anterior también cuenta como nueva
        assert!(guard.mark("a-b-c-false"));
    }
}
