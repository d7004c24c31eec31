use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        document::{DocumentType, ProviderDocument, ALLOWED_CONTENT_TYPES, MAX_DOCUMENT_BYTES},
        profile::VerificationStatus,
    },
    services::encryption::{decrypt_blob, derive_provider_key, encrypt_blob, parse_master_key},
};

pub struct DocumentService;

impl DocumentService {
    /// Stores a verification document encrypted at rest.
    ///
    /// Expects a `document_type` field and a `file` field. A supplier asked
    /// for more information goes back to the verification queue.
    pub async fn upload(
        pool: &PgPool,
        config: &Config,
        provider_id: Uuid,
        verification: VerificationStatus,
        mut multipart: Multipart,
    ) -> AppResult<ProviderDocument> {
        let mut file_data: Option<(Vec<u8>, String, String)> = None;
        let mut document_type: Option<DocumentType> = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::bad_request(format!("Formulario inválido: {e}")))?
        {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" => {
                    let filename = field.file_name().unwrap_or("documento").to_string();
                    let ct = field
                        .content_type()
                        .map(str::to_string)
                        .unwrap_or_else(|| {
                            mime_guess::from_path(&filename)
                                .first_or_octet_stream()
                                .essence_str()
                                .to_string()
                        });
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::bad_request(format!("Archivo inválido: {e}")))?
                        .to_vec();
                    file_data = Some((bytes, filename, ct));
                }
                "document_type" => {
                    let raw = field
                        .text()
                        .await
                        .map_err(|e| AppError::bad_request(format!("Formulario inválido: {e}")))?;
                    document_type = Some(
                        raw.trim()
                            .parse()
                            .map_err(|_| AppError::bad_request("Tipo de documento inválido"))?,
                    );
                }
                _ => {}
            }
        }

        let document_type =
            document_type.ok_or_else(|| AppError::bad_request("Indica el tipo de documento"))?;
        let (bytes, original_filename, content_type) =
            file_data.ok_or_else(|| AppError::bad_request("Falta el archivo"))?;
        if bytes.is_empty() {
            return Err(AppError::bad_request("El archivo está vacío"));
        }
        if bytes.len() > MAX_DOCUMENT_BYTES {
            return Err(AppError::bad_request("El archivo supera los 10 MB"));
        }
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(AppError::bad_request("Formato no permitido (PDF, JPG, PNG o WEBP)"));
        }

        let master = parse_master_key(&config.document_encryption_key)?;
        let key = derive_provider_key(&master, provider_id)?;
        let blob = encrypt_blob(&bytes, &key)?;

        let dir = PathBuf::from(&config.documents_dir).join(provider_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(anyhow::Error::from)?;
        let storage_rel = format!("{}/{}.enc", provider_id, Uuid::new_v4());
        tokio::fs::write(Path::new(&config.documents_dir).join(&storage_rel), &blob)
            .await
            .map_err(anyhow::Error::from)?;

        let mut tx = pool.begin().await?;
        let doc = sqlx::query_as::<_, ProviderDocument>(
            "INSERT INTO provider_documents
             (provider_id, document_type, original_filename, storage_path, content_type, size_bytes)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(provider_id)
        .bind(document_type.as_str())
        .bind(&original_filename)
        .bind(&storage_rel)
        .bind(&content_type)
        .bind(bytes.len() as i64)
        .fetch_one(&mut *tx)
        .await?;

        if verification == VerificationStatus::MoreInfoNeeded {
            sqlx::query(
                "UPDATE profiles SET verification_status = 'pending', updated_at = NOW()
                 WHERE id = $1 AND verification_status = 'more_info_needed'",
            )
            .bind(provider_id)
            .execute(&mut *tx)
            .await?;
            tracing::info!("Supplier {} back in the verification queue", provider_id);
        }
        tx.commit().await?;

        tracing::info!(
            "Document {} ({}) uploaded by {}, {} bytes",
            doc.id,
            doc.document_type,
            provider_id,
            doc.size_bytes
        );
        Ok(doc)
    }

    pub async fn list(pool: &PgPool, provider_id: Uuid) -> AppResult<Vec<ProviderDocument>> {
        let docs = sqlx::query_as::<_, ProviderDocument>(
            "SELECT * FROM provider_documents WHERE provider_id = $1 ORDER BY uploaded_at DESC",
        )
        .bind(provider_id)
        .fetch_all(pool)
        .await?;
        Ok(docs)
    }

    /// Loads and decrypts a document of the given supplier.
    pub async fn read(
        pool: &PgPool,
        config: &Config,
        provider_id: Uuid,
        document_id: Uuid,
    ) -> AppResult<(ProviderDocument, Vec<u8>)> {
        let doc = sqlx::query_as::<_, ProviderDocument>(
            "SELECT * FROM provider_documents WHERE id = $1 AND provider_id = $2",
        )
        .bind(document_id)
        .bind(provider_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Documento no encontrado"))?;

        let blob = tokio::fs::read(Path::new(&config.documents_dir).join(&doc.storage_path))
            .await
            .map_err(|e| anyhow::anyhow!("Document {} unreadable: {}", doc.id, e))?;
        let master = parse_master_key(&config.document_encryption_key)?;
        let key = derive_provider_key(&master, provider_id)?;
        let plaintext = decrypt_blob(&blob, &key)?;
        Ok((doc, plaintext))
    }
}
