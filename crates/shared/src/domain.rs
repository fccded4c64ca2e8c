use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ProjectId);
id_newtype!(ShipmentId);

/// Which side of a collaboration the signed-in user is on.
///
/// The brand ships the product ("marca"), the creator receives it and, when
/// required, sends it back ("creador").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "marca")]
    Client,
    #[serde(alias = "creador")]
    Creator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Creator => "creator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "client" | "marca" | "brand" => Ok(Role::Client),
            "creator" | "creador" => Ok(Role::Creator),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Server-side shipment status, declared in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Pending,
    LabelCreated,
    InTransit,
    Delivered,
    ReturnRequested,
    Returned,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 6] = [
        ShipmentStatus::Pending,
        ShipmentStatus::LabelCreated,
        ShipmentStatus::InTransit,
        ShipmentStatus::Delivered,
        ShipmentStatus::ReturnRequested,
        ShipmentStatus::Returned,
    ];

    pub fn rank(self) -> u8 {
        match self {
            ShipmentStatus::Pending => 0,
            ShipmentStatus::LabelCreated => 1,
            ShipmentStatus::InTransit => 2,
            ShipmentStatus::Delivered => 3,
            ShipmentStatus::ReturnRequested => 4,
            ShipmentStatus::Returned => 5,
        }
    }

    pub fn is_return_phase(self) -> bool {
        matches!(
            self,
            ShipmentStatus::ReturnRequested | ShipmentStatus::Returned
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "pending",
            ShipmentStatus::LabelCreated => "label_created",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::ReturnRequested => "return_requested",
            ShipmentStatus::Returned => "returned",
        }
    }

    /// Badge text shown next to the tracking number.
    pub fn label(self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "Pendiente",
            ShipmentStatus::LabelCreated => "Etiqueta creada",
            ShipmentStatus::InTransit => "En tránsito",
            ShipmentStatus::Delivered => "Entregado",
            ShipmentStatus::ReturnRequested => "Devolución solicitada",
            ShipmentStatus::Returned => "Devuelto",
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown shipment status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ShipmentStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ShipmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == raw.trim())
            .ok_or_else(|| UnknownStatus(raw.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub number: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: String,
}

impl Address {
    /// Names of the fields left blank, in form order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("street", &self.street),
            ("number", &self.number),
            ("city", &self.city),
            ("state", &self.state),
            ("postal_code", &self.postal_code),
            ("phone", &self.phone),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Package size in centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
    pub length: f64,
}

impl Dimensions {
    pub fn volume(&self) -> f64 {
        self.width * self.height * self.length
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            width: 20.0,
            height: 15.0,
            length: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub project_id: ProjectId,
    pub status: ShipmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_label_url: Option<String>,
    #[serde(default)]
    pub return_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
