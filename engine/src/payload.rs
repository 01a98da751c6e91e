//! Typed payloads for queued actions.
//!
//! The queue table is polymorphic but every row carries one of these variants,
//! tagged by [`ActionKind`]. The variant decides both the request body built
//! at replay time and the cache patch applied once the server accepts it.

use crate::binary::BinaryAttachment;
use crate::route::{ItemChange, RoutePatch, STATUS_COMPLETED, STATUS_IN_PROGRESS};
use crate::{error::Result, ActionKind, Error, RouteId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A location ping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPayload {
    pub employee_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub recorded_at: Timestamp,
}

/// A check-in or check-out at a route item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitPayload {
    pub route_id: RouteId,
    pub item_id: String,
    pub at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A product count taken at a route item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCheckPayload {
    pub route_id: RouteId,
    pub item_id: String,
    pub product_id: String,
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    pub checked_at: Timestamp,
}

/// Photo evidence, optionally tied to a route item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<RouteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub taken_at: Timestamp,
    pub attachment: BinaryAttachment,
}

/// An employee document (certificate, receipt, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadPayload {
    pub employee_id: String,
    pub document_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub attachment: BinaryAttachment,
}

/// A free-form form submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormPayload {
    pub body: Value,
}

/// Time clock punch types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClockEvent {
    Entry,
    BreakStart,
    BreakEnd,
    Exit,
}

/// A time clock punch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeClockPayload {
    pub employee_id: String,
    pub event: ClockEvent,
    pub at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// The payload of a queued action, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionPayload {
    Location(LocationPayload),
    Checkin(VisitPayload),
    Checkout(VisitPayload),
    ProductCheck(ProductCheckPayload),
    Photo(PhotoPayload),
    DocumentUpload(DocumentUploadPayload),
    Form(FormPayload),
    TimeClock(TimeClockPayload),
}

/// A decoded file part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field_name: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// The request body sent for an action.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayBody {
    Json(Value),
    Multipart {
        file: FilePart,
        /// Text fields sent alongside the file, in a stable order
        fields: Vec<(String, String)>,
    },
}

impl ActionPayload {
    /// The kind tag of this payload.
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionPayload::Location(_) => ActionKind::Location,
            ActionPayload::Checkin(_) => ActionKind::Checkin,
            ActionPayload::Checkout(_) => ActionKind::Checkout,
            ActionPayload::ProductCheck(_) => ActionKind::ProductCheck,
            ActionPayload::Photo(_) => ActionKind::Photo,
            ActionPayload::DocumentUpload(_) => ActionKind::DocumentUpload,
            ActionPayload::Form(_) => ActionKind::Form,
            ActionPayload::TimeClock(_) => ActionKind::TimeClock,
        }
    }

    /// The encoded file this payload carries, if any.
    pub fn attachment(&self) -> Option<&BinaryAttachment> {
        match self {
            ActionPayload::Photo(p) => Some(&p.attachment),
            ActionPayload::DocumentUpload(d) => Some(&d.attachment),
            _ => None,
        }
    }

    /// Decode a stored payload and check it against the stored kind column.
    pub fn from_stored(kind: ActionKind, json: &str) -> Result<Self> {
        let payload: ActionPayload = serde_json::from_str(json)?;
        if payload.kind() != kind {
            return Err(Error::KindMismatch {
                expected: kind,
                actual: payload.kind(),
            });
        }
        Ok(payload)
    }

    /// Build the request body for this payload.
    ///
    /// Payloads with an attachment become multipart uploads: the data URL is
    /// decoded into the file part and every other non-null field is sent as
    /// text. Everything else is sent as the variant's JSON.
    pub fn replay_body(&self) -> Result<ReplayBody> {
        let mut value = self.inner_json()?;

        let Some(attachment) = self.attachment() else {
            return Ok(ReplayBody::Json(value));
        };

        let decoded = attachment.decode()?;
        let mut fields = Vec::new();
        if let Some(obj) = value.as_object_mut() {
            obj.remove("attachment");
            fields = text_fields(obj);
        }

        Ok(ReplayBody::Multipart {
            file: FilePart {
                field_name: attachment.field_name.clone(),
                file_name: attachment.file_name.clone(),
                mime: decoded.mime,
                bytes: decoded.bytes,
            },
            fields,
        })
    }

    /// The cache patch implied by this action, if it targets a route item.
    pub fn route_patch(&self) -> Option<RoutePatch> {
        match self {
            ActionPayload::Checkin(v) => Some(RoutePatch::set_fields(
                v.route_id.clone(),
                v.item_id.clone(),
                [
                    ("status", json!(STATUS_IN_PROGRESS)),
                    ("checkInAt", json!(v.at)),
                ],
            )),
            ActionPayload::Checkout(v) => Some(RoutePatch::set_fields(
                v.route_id.clone(),
                v.item_id.clone(),
                [
                    ("status", json!(STATUS_COMPLETED)),
                    ("checkOutAt", json!(v.at)),
                ],
            )),
            ActionPayload::ProductCheck(p) => Some(RoutePatch {
                route_id: p.route_id.clone(),
                item_id: p.item_id.clone(),
                change: ItemChange::SetProductCount {
                    product_id: p.product_id.clone(),
                    quantity: p.quantity,
                },
            }),
            ActionPayload::Photo(PhotoPayload {
                route_id: Some(route_id),
                item_id: Some(item_id),
                ..
            }) => Some(RoutePatch {
                route_id: route_id.clone(),
                item_id: item_id.clone(),
                change: ItemChange::Increment {
                    field: "photoCount".to_string(),
                },
            }),
            _ => None,
        }
    }

    fn inner_json(&self) -> Result<Value> {
        let value = match self {
            ActionPayload::Location(p) => serde_json::to_value(p)?,
            ActionPayload::Checkin(p) | ActionPayload::Checkout(p) => serde_json::to_value(p)?,
            ActionPayload::ProductCheck(p) => serde_json::to_value(p)?,
            ActionPayload::Photo(p) => serde_json::to_value(p)?,
            ActionPayload::DocumentUpload(p) => serde_json::to_value(p)?,
            ActionPayload::Form(p) => p.body.clone(),
            ActionPayload::TimeClock(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }
}

fn text_fields(obj: &Map<String, Value>) -> Vec<(String, String)> {
    let mut fields: Vec<_> = obj
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect();
    fields.sort();
    fields
}
