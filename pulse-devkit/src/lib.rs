/*!
# Pulse DevKit - Stubs et utilitaires de test

Bibliothèque facilitant les tests du noyau Pulse avec :
- Backend ServiceControl simulé
- Push channel simulé, sans broker
- Payloads d'événements au format du backend
- Harness de session complète
*/

pub mod builders;
pub mod mock_backend;
pub mod push_stub;
pub mod test_utils;

pub use builders::PulseEventBuilder;
pub use mock_backend::MockServiceControl;
pub use push_stub::{MockPushChannel, MockPushTransport};
pub use test_utils::{wait_until, TestHarness};
