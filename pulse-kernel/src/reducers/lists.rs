use super::{unexpected, Reducer};
use crate::events::{Event, EventKind, MessageFailed};
use crate::models::{Alert, FailedMessage, FailedMessageStats, Tag, TAG_CATEGORIES};
use serde::Serialize;

/// Ajoute `item` sauf si un élément de même identifiant est déjà présent.
/// Sans identifiant, l'élément est toujours ajouté.
fn push_unique<T>(items: &mut Vec<T>, item: T, id: impl Fn(&T) -> Option<&str>) -> bool {
    if let Some(key) = id(&item) {
        if items.iter().any(|existing| id(existing) == Some(key)) {
            return false;
        }
    }
    items.push(item);
    true
}

/// Tags de filtrage, catégorie par catégorie dans l'ordre d'affichage.
/// Une catégorie absente des stats est simplement ignorée.
pub fn tags_from_stats(stats: &FailedMessageStats) -> Vec<Tag> {
    TAG_CATEGORIES
        .iter()
        .filter_map(|category| stats.get(*category).map(|facet| (category, facet)))
        .flat_map(|(category, facet)| {
            facet.values.iter().map(move |value| Tag {
                category: category.to_string(),
                label: value.range.clone(),
            })
        })
        .collect()
}

impl From<&MessageFailed> for FailedMessage {
    fn from(event: &MessageFailed) -> Self {
        FailedMessage {
            id: event.failed_message_id.clone(),
            message_type: event.message_type.clone(),
            receiving_endpoint: event.receiving_endpoint.clone(),
            time_of_failure: event.time_of_failure,
            exception_message: event.exception_message.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct AlertsReducer {
    items: Vec<Alert>,
}

impl AlertsReducer {
    pub fn replace(&mut self, alerts: Vec<Alert>) {
        self.items.clear();
        for alert in alerts {
            push_unique(&mut self.items, alert, |a| a.id.as_deref());
        }
    }
}

impl Reducer for AlertsReducer {
    type Snapshot = Vec<Alert>;

    fn consumes(&self) -> &'static [EventKind] {
        &[EventKind::AlertRaised]
    }

    fn apply(&mut self, event: &Event) -> anyhow::Result<()> {
        match event {
            Event::AlertRaised(alert) => {
                push_unique(&mut self.items, alert.clone(), |a| a.id.as_deref());
                Ok(())
            }
            other => unexpected(other),
        }
    }

    fn snapshot(&self) -> Vec<Alert> {
        self.items.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedMessagesSnapshot {
    pub number_of_failed_messages: u64,
    pub messages: Vec<FailedMessage>,
    pub tags: Vec<Tag>,
}

/// Liste des messages en échec : le nombre affiché est la taille de la
/// liste dé-dupliquée, pas un compteur incrémenté à part.
#[derive(Debug, Default)]
pub struct FailedMessagesReducer {
    messages: Vec<FailedMessage>,
    tags: Vec<Tag>,
}

impl FailedMessagesReducer {
    pub fn replace(&mut self, messages: Vec<FailedMessage>) {
        self.messages.clear();
        for message in messages {
            push_unique(&mut self.messages, message, |m| Some(m.id.as_str()));
        }
    }

    pub fn set_stats(&mut self, stats: &FailedMessageStats) {
        self.tags = tags_from_stats(stats);
    }
}

impl Reducer for FailedMessagesReducer {
    type Snapshot = FailedMessagesSnapshot;

    fn consumes(&self) -> &'static [EventKind] {
        &[EventKind::MessageFailed]
    }

    fn apply(&mut self, event: &Event) -> anyhow::Result<()> {
        match event {
            Event::MessageFailed(failed) => {
                push_unique(&mut self.messages, FailedMessage::from(failed), |m| Some(m.id.as_str()));
                Ok(())
            }
            other => unexpected(other),
        }
    }

    fn snapshot(&self) -> FailedMessagesSnapshot {
        FailedMessagesSnapshot {
            number_of_failed_messages: self.messages.len() as u64,
            messages: self.messages.clone(),
            tags: self.tags.clone(),
        }
    }
}
