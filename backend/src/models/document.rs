use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Cedula,
    LicenciaConducir,
    Vehiculo,
    PermisoSanitario,
    Certificacion,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Cedula => "cedula",
            DocumentType::LicenciaConducir => "licencia_conducir",
            DocumentType::Vehiculo => "vehiculo",
            DocumentType::PermisoSanitario => "permiso_sanitario",
            DocumentType::Certificacion => "certificacion",
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cedula" => Ok(DocumentType::Cedula),
            "licencia_conducir" => Ok(DocumentType::LicenciaConducir),
            "vehiculo" => Ok(DocumentType::Vehiculo),
            "permiso_sanitario" => Ok(DocumentType::PermisoSanitario),
            "certificacion" => Ok(DocumentType::Certificacion),
            _ => Err(anyhow::anyhow!("Unknown document_type: {s}")),
        }
    }
}

/// Upload formats accepted for verification documents.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png", "image/webp"];

pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProviderDocument {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub document_type: String,
    pub original_filename: String,
    #[serde(skip_serializing)]
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_at: DateTime<Utc>,
}
