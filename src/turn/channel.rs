//! Buffering channel: the in-turn output sink

use uuid::Uuid;

use crate::value_objects::{Activity, ActivityType};

/// Namespace for outbound activity ids
const OUTBOUND_NAMESPACE: Uuid = Uuid::from_u128(0x6c8f_13c2_5a4e_4b7e_9d1f_3e0a_7b2c_9e41);

/// Collects outbound activities in order instead of transmitting them
///
/// Ids handed out are name-based UUIDs derived from the conversation, the
/// inbound activity and the position in the buffer, so replaying a turn
/// yields identical ids.
#[derive(Debug, Clone, Default)]
pub struct BufferingChannel {
    conversation_id: String,
    inbound_id: String,
    sequence: u64,
    activities: Vec<Activity>,
}

impl BufferingChannel {
    /// Create a channel for the turn started by `inbound`
    pub fn for_turn(inbound: &Activity) -> Self {
        Self {
            conversation_id: inbound.conversation_id.clone(),
            inbound_id: inbound.id.clone().unwrap_or_default(),
            sequence: 0,
            activities: Vec::new(),
        }
    }

    fn next_id(&mut self) -> String {
        self.sequence += 1;
        let name = format!("{}/{}/{}", self.conversation_id, self.inbound_id, self.sequence);
        Uuid::new_v5(&OUTBOUND_NAMESPACE, name.as_bytes()).to_string()
    }

    /// Buffer an activity, assigning an id when it has none
    pub fn send(&mut self, mut activity: Activity) -> String {
        let id = match activity.id.clone() {
            Some(id) => id,
            None => {
                let id = self.next_id();
                activity.id = Some(id.clone());
                id
            }
        };
        self.activities.push(activity);
        id
    }

    /// Buffer a replacement for a previously sent activity
    pub fn update(&mut self, mut activity: Activity) {
        activity.activity_type = ActivityType::MessageUpdate;
        self.activities.push(activity);
    }

    /// Buffer the removal of a previously sent activity
    pub fn delete(&mut self, template: &Activity, activity_id: impl Into<String>) {
        let mut delete = Activity::new(
            ActivityType::MessageDelete,
            template.conversation_id.clone(),
            template.from.clone(),
        );
        delete.recipient = template.recipient.clone();
        delete.id = Some(activity_id.into());
        delete.timestamp = template.timestamp;
        self.activities.push(delete);
    }

    /// Activities buffered so far
    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Take every buffered activity, in emission order
    pub fn drain(&mut self) -> Vec<Activity> {
        std::mem::take(&mut self.activities)
    }
}
