use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::manager::DatabaseError;

/// Lifecycle of an organisation in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganisationStatus {
    Active,
    Pending,
    Suspended,
    Inactive,
}

impl FromStr for OrganisationStatus {
    type Err = DatabaseError;

    /// Accepts both the codes stored by the onboarding flow (`actif`,
    /// `en_attente`, ...) and their English names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "actif" | "active" => Ok(Self::Active),
            "en_attente" | "pending" => Ok(Self::Pending),
            "suspendu" | "suspended" => Ok(Self::Suspended),
            "inactif" | "inactive" => Ok(Self::Inactive),
            other => Err(DatabaseError::Decode(format!(
                "unknown organisation status '{}'",
                other
            ))),
        }
    }
}

/// Identity record of one tenant. Read-only from this crate's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organisation {
    pub id: i32,
    pub name: String,
    pub database_name: String,
    pub status: OrganisationStatus,
    /// Overrides the shared database host for this organisation only.
    pub host: Option<String>,
}

impl Organisation {
    pub fn new(id: i32, name: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            database_name: database_name.into(),
            status: OrganisationStatus::Active,
            host: None,
        }
    }

    pub fn with_status(mut self, status: OrganisationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == OrganisationStatus::Active
    }
}

/// Row shape of the registry's `organisations` table.
#[derive(Debug, FromRow)]
pub(crate) struct OrganisationRow {
    pub id: i32,
    pub nom: String,
    pub database_name: String,
    pub statut: String,
}

impl TryFrom<OrganisationRow> for Organisation {
    type Error = DatabaseError;

    fn try_from(row: OrganisationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.nom,
            database_name: row.database_name,
            status: row.statut.parse()?,
            host: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_and_english_statuses() {
        assert_eq!("actif".parse::<OrganisationStatus>().unwrap(), OrganisationStatus::Active);
        assert_eq!("Suspendu".parse::<OrganisationStatus>().unwrap(), OrganisationStatus::Suspended);
        assert_eq!("en_attente".parse::<OrganisationStatus>().unwrap(), OrganisationStatus::Pending);
        assert_eq!("inactive".parse::<OrganisationStatus>().unwrap(), OrganisationStatus::Inactive);
        assert!("archived".parse::<OrganisationStatus>().is_err());
    }

    #[test]
    fn converts_registry_row() {
        let org = Organisation::try_from(OrganisationRow {
            id: 3,
            nom: "Transport Rapide".into(),
            database_name: "shipnology_transport_rapide".into(),
            statut: "suspendu".into(),
        })
        .unwrap();
        assert_eq!(org.name, "Transport Rapide");
        assert!(!org.is_active());
        // The registry table carries no host override.
        assert_eq!(org.host, None);
    }
}
