//! Typed webhook events
//!
//! Narrow serde structs instead of the `async-stripe` event types: only three
//! event kinds and a handful of their fields are read, and the full SDK
//! models pin a provider API version. Unknown fields are ignored so newer
//! provider API versions keep deserializing.

use std::collections::HashMap;

use serde::Deserialize;

use propvest_shared::UserId;

use crate::error::{BillingError, BillingResult};

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Metadata key the checkout endpoint uses to carry our user id
pub const USER_ID_METADATA_KEY: &str = "user_id";

type Metadata = HashMap<String, String>;

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: Option<i64>,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

/// A verified provider event
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub id: String,
    pub created: Option<i64>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    CheckoutCompleted(CheckoutSession),
    SubscriptionUpdated(Subscription),
    SubscriptionDeleted(Subscription),
    Unhandled { event_type: String },
}

impl WebhookEvent {
    /// Parse a raw event body. The body must already be signature-verified.
    pub fn parse(payload: &str) -> BillingResult<Self> {
        let raw: RawEvent = serde_json::from_str(payload)?;

        let payload = match raw.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                EventPayload::CheckoutCompleted(object_as(raw.data.object, "checkout session")?)
            }
            SUBSCRIPTION_UPDATED => {
                EventPayload::SubscriptionUpdated(object_as(raw.data.object, "subscription")?)
            }
            SUBSCRIPTION_DELETED => {
                EventPayload::SubscriptionDeleted(object_as(raw.data.object, "subscription")?)
            }
            _ => EventPayload::Unhandled {
                event_type: raw.event_type.clone(),
            },
        };

        Ok(Self {
            id: raw.id,
            created: raw.created,
            payload,
        })
    }

    pub fn event_type(&self) -> &str {
        match &self.payload {
            EventPayload::CheckoutCompleted(_) => CHECKOUT_SESSION_COMPLETED,
            EventPayload::SubscriptionUpdated(_) => SUBSCRIPTION_UPDATED,
            EventPayload::SubscriptionDeleted(_) => SUBSCRIPTION_DELETED,
            EventPayload::Unhandled { event_type } => event_type,
        }
    }
}

fn object_as<T: serde::de::DeserializeOwned>(
    object: serde_json::Value,
    expected: &str,
) -> BillingResult<T> {
    serde_json::from_value(object)
        .map_err(|e| BillingError::MalformedPayload(format!("expected {}: {}", expected, e)))
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// `checkout.session` object
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl CheckoutSession {
    /// `metadata.user_id`, falling back to `client_reference_id`
    pub fn user_id(&self) -> Option<UserId> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(USER_ID_METADATA_KEY))
            .and_then(|id| UserId::parse(id))
            .or_else(|| {
                self.client_reference_id
                    .as_deref()
                    .and_then(UserId::parse)
            })
    }

    /// Purchased plan, as recorded in session metadata at checkout creation
    pub fn plan_id(&self) -> Option<&str> {
        let metadata = self.metadata.as_ref()?;
        ["price_id", "plan_id", "plan"]
            .iter()
            .find_map(|key| non_empty(metadata.get(*key)))
    }
}

/// `subscription` object
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub items: Option<SubscriptionItems>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub price: Option<ObjectRef>,
    #[serde(default)]
    pub plan: Option<ObjectRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObjectRef {
    pub id: String,
}

impl Subscription {
    pub fn user_id(&self) -> Option<UserId> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(USER_ID_METADATA_KEY))
            .and_then(|id| UserId::parse(id))
    }

    /// Current plan: first item's price, then its legacy plan, then metadata
    pub fn plan_id(&self) -> Option<&str> {
        let first_item = self.items.as_ref().and_then(|items| items.data.first());

        first_item
            .and_then(|item| item.price.as_ref())
            .and_then(|price| non_empty(Some(&price.id)))
            .or_else(|| {
                first_item
                    .and_then(|item| item.plan.as_ref())
                    .and_then(|plan| non_empty(Some(&plan.id)))
            })
            .or_else(|| {
                self.metadata
                    .as_ref()
                    .and_then(|m| non_empty(m.get("price_id")))
            })
    }
}
