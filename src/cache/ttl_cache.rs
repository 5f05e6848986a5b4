use parking_lot::Mutex;
use std::{
    collections::HashMap,
    hash::Hash,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;

/// Entrada del cache con expiración absoluta opcional
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expire_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expire_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    // Comparación estricta: una entrada con TTL cero sigue viva dentro del
    // mismo instante en que fue escrita.
    fn is_expired(&self, now: Instant) -> bool {
        match self.expire_at {
            Some(expire_at) => now > expire_at,
            None => false,
        }
    }
}

/// Resultado de la consulta de TTL de una clave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// Segundos enteros restantes (truncados).
    Remaining(u64),
    /// La entrada existe y no expira.
    NoExpiry,
    /// La clave no existe o acaba de expirar.
    Missing,
}

/// Cache clave-valor con TTL opcional y evicción perezosa
#[derive(Debug)]
pub struct TtlCache<K: Eq + Hash, V> {
    store: Arc<Mutex<HashMap<K, CacheEntry<V>>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Guarda un valor, sobrescribiendo cualquier entrada previa.
    /// Sin `ttl` la entrada no expira hasta un `delete` explícito.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, ttl);
        self.store.lock().insert(key, entry);
    }

    /// Recupera un valor. Una entrada expirada se elimina aquí mismo
    /// y se reporta como ausente.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut store = self.store.lock();
        match store.get(key) {
            Some(entry) if entry.is_expired(now) => {
                store.remove(key);
                debug!("entrada expirada eliminada del cache");
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Elimina una clave. No es error si no existe.
    pub fn delete(&self, key: &K) {
        self.store.lock().remove(key);
    }

    /// Consulta el TTL restante de una clave (tres estados).
    #[allow(dead_code)]
    pub fn ttl(&self, key: &K) -> TtlStatus {
        let now = Instant::now();
        let mut store = self.store.lock();
        let Some(entry) = store.get(key) else {
            return TtlStatus::Missing;
        };
        match entry.expire_at {
            None => TtlStatus::NoExpiry,
            Some(expire_at) => {
                let remaining = expire_at.saturating_duration_since(now);
                if remaining.is_zero() {
                    store.remove(key);
                    TtlStatus::Missing
                } else {
                    TtlStatus::Remaining(remaining.as_secs())
                }
            }
        }
    }

    /// Fija una nueva expiración `now + ttl` sobre una entrada viva.
    /// Devuelve `false` sin mutar si la clave no existe o ya expiró.
    #[allow(dead_code)]
    pub fn expire(&self, key: &K, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut store = self.store.lock();
        match store.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                store.remove(key);
                false
            }
            Some(entry) => {
                entry.expire_at = Some(now + ttl);
                true
            }
            None => false,
        }
    }

    /// Cantidad de entradas, incluyendo las expiradas aún no tocadas.
    /// Solo para tests; no hay operación de enumeración pública.
    #[cfg(test)]
    fn raw_len(&self) -> usize {
        self.store.lock().len()
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}
