use parking_lot::Mutex;
use std::sync::Arc;

/// État partagé mono-écrivain : chaque reducer possède le sien, les vues ne
/// font que lire des copies.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Copie de l'état sans garder le verrou au-delà de l'appel
pub fn read_state<T: Clone>(state: &Shared<T>) -> T {
    state.lock().clone()
}
