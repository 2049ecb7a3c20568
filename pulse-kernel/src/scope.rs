/**
 * SCOPES - Durée de vie des contextes de visualisation
 *
 * RÔLE :
 * Un ScopeToken représente la durée de vie d'une vue transitoire. Tout ce qui
 * est créé sous ce token (abonnements du notifier, tâches de polling,
 * fetchs initiaux) est libéré en une seule opération `release()`.
 *
 * FONCTIONNEMENT :
 * - Basé sur tokio_util::CancellationToken (annulation idempotente, observable)
 * - `child()` crée un sous-scope : libérer le parent libère les enfants
 * - Le notifier vérifie `is_released()` juste avant chaque invocation
 * - Le scheduler attend `released()` dans sa boucle de ticks
 */

use std::fmt;
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

#[derive(Clone)]
pub struct ScopeToken {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    id: Uuid,
    label: String,
    cancel: CancellationToken,
}

impl ScopeToken {
    pub fn new(label: impl Into<String>) -> Self {
        Self::from_cancel(label.into(), CancellationToken::new())
    }

    fn from_cancel(label: String, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: Uuid::new_v4(),
                label,
                cancel,
            }),
        }
    }

    /// Sous-scope libéré en même temps que son parent (ou seul)
    pub fn child(&self, label: impl Into<String>) -> Self {
        Self::from_cancel(label.into(), self.inner.cancel.child_token())
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_released(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Libère le scope. Idempotent.
    pub fn release(&self) {
        if !self.inner.cancel.is_cancelled() {
            tracing::debug!("[scope] releasing {} ({})", self.inner.label, self.inner.id);
        }
        self.inner.cancel.cancel();
    }

    /// Future résolue quand le scope (ou un parent) est libéré
    pub fn released(&self) -> WaitForCancellationFuture<'_> {
        self.inner.cancel.cancelled()
    }

    /// Token d'annulation dérivé, pour une tâche annulable individuellement
    pub(crate) fn child_cancel(&self) -> CancellationToken {
        self.inner.cancel.child_token()
    }
}

impl fmt::Debug for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeToken")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("released", &self.is_released())
            .finish()
    }
}

impl PartialEq for ScopeToken {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ScopeToken {}
