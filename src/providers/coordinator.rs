use std::sync::Arc;
use tracing::warn;

use super::{LookupError, MetadataProvider, TrackMetadata, TrackQuery};

/// Coordina la búsqueda de metadata entre dos proveedores alternativos.
///
/// Empieza por el primario. Un rechazo por rate limit alterna al otro
/// proveedor y descuenta el presupuesto de reintentos; el ping-pong sigue
/// hasta que alguno responde o el presupuesto se agota. Cualquier otro
/// fallo (transporte, sin resultados, JSON inválido) es terminal y no
/// dispara el cambio de proveedor.
pub struct LookupCoordinator {
    primary: Arc<dyn MetadataProvider>,
    secondary: Arc<dyn MetadataProvider>,
    retry_budget: u32,
}

impl LookupCoordinator {
    pub fn new(
        primary: Arc<dyn MetadataProvider>,
        secondary: Arc<dyn MetadataProvider>,
        retry_budget: u32,
    ) -> Self {
        Self {
            primary,
            secondary,
            retry_budget,
        }
    }

    pub async fn lookup(&self, query: &TrackQuery) -> Result<TrackMetadata, LookupError> {
        let providers = [&self.primary, &self.secondary];
        let mut budget = self.retry_budget;
        let mut index = 0;

        loop {
            let provider = providers[index];
            match provider.lookup(query).await {
                Ok(metadata) => return Ok(metadata),
                Err(LookupError::RateLimited { host }) => {
                    if budget == 0 {
                        return Err(LookupError::Exhausted);
                    }
                    warn!(
                        "{} limitado por {}, alternando al otro proveedor ({} intentos restantes)",
                        provider.name(),
                        host,
                        budget
                    );
                    budget -= 1;
                    index = 1 - index;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockMetadataProvider;
    use pretty_assertions::assert_eq;

    fn query() -> TrackQuery {
        TrackQuery {
            title: "Reckoner".to_string(),
            artist: "Radiohead".to_string(),
            album: None,
        }
    }

    fn rate_limited() -> LookupError {
        LookupError::RateLimited {
            host: "api.example.com".to_string(),
        }
    }

    fn metadata(title: &str) -> TrackMetadata {
        TrackMetadata {
            title: Some(title.to_string()),
            ..TrackMetadata::default()
        }
    }

    fn provider_named(name: &'static str) -> MockMetadataProvider {
        let mut mock = MockMetadataProvider::new();
        mock.expect_name().return_const(name);
        mock
    }

    #[tokio::test]
    async fn test_primary_result_wins() {
        let mut primary = provider_named("primary");
        primary
            .expect_lookup()
            .times(1)
            .returning(|_| Ok(metadata("from-primary")));
        let mut secondary = provider_named("secondary");
        secondary.expect_lookup().times(0);

        let coordinator = LookupCoordinator::new(Arc::new(primary), Arc::new(secondary), 4);
        let result = coordinator.lookup(&query()).await.unwrap();
        assert_eq!(result.title.as_deref(), Some("from-primary"));
    }

    #[tokio::test]
    async fn test_rate_limited_primary_falls_back() {
        let mut primary = provider_named("primary");
        primary
            .expect_lookup()
            .times(1)
            .returning(|_| Err(rate_limited()));
        let mut secondary = provider_named("secondary");
        secondary
            .expect_lookup()
            .times(1)
            .returning(|_| Ok(metadata("from-secondary")));

        let coordinator = LookupCoordinator::new(Arc::new(primary), Arc::new(secondary), 4);
        let result = coordinator.lookup(&query()).await.unwrap();
        assert_eq!(result.title.as_deref(), Some("from-secondary"));
    }

    #[tokio::test]
    async fn test_ping_pong_exhausts_budget() {
        let mut primary = provider_named("primary");
        primary.expect_lookup().times(2).returning(|_| Err(rate_limited()));
        let mut secondary = provider_named("secondary");
        secondary.expect_lookup().times(2).returning(|_| Err(rate_limited()));

        // presupuesto 3: primario, secundario, primario, secundario, agotado
        let coordinator = LookupCoordinator::new(Arc::new(primary), Arc::new(secondary), 3);
        let err = coordinator.lookup(&query()).await.unwrap_err();
        assert!(matches!(err, LookupError::Exhausted));
        assert_eq!(err.to_string(), "No results found after multiple attempts");
    }

    #[tokio::test]
    async fn test_non_rate_limit_failure_is_terminal() {
        let mut primary = provider_named("primary");
        primary
            .expect_lookup()
            .times(1)
            .returning(|_| Err(LookupError::NoResults));
        let mut secondary = provider_named("secondary");
        secondary.expect_lookup().times(0);

        let coordinator = LookupCoordinator::new(Arc::new(primary), Arc::new(secondary), 4);
        let err = coordinator.lookup(&query()).await.unwrap_err();
        assert!(matches!(err, LookupError::NoResults));
    }

    #[tokio::test]
    async fn test_zero_budget_fails_on_first_rate_limit() {
        let mut primary = provider_named("primary");
        primary
            .expect_lookup()
            .times(1)
            .returning(|_| Err(rate_limited()));
        let mut secondary = provider_named("secondary");
        secondary.expect_lookup().times(0);

        let coordinator = LookupCoordinator::new(Arc::new(primary), Arc::new(secondary), 0);
        let err = coordinator.lookup(&query()).await.unwrap_err();
        assert!(matches!(err, LookupError::Exhausted));
    }
}
