//! Resolução do template de SO (apenas Proxmox)

use crate::backend::TemplateStore;
use crate::error::ProvisionError;
use anyhow::Result;
use serde::Serialize;
use std::fmt;

/// Volid de um template disponível localmente
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TemplateReference(String);

impl TemplateReference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Primeiro template local cujo nome contém `pattern`. Sem nenhum, atualiza o
/// catálogo, baixa `fallback` e consulta de novo, uma única vez.
pub fn resolve_template(
    store: &dyn TemplateStore,
    pattern: &str,
    fallback: &str,
) -> Result<TemplateReference> {
    if let Some(found) = first_match(store.list_templates()?, pattern) {
        tracing::info!(template = %found, "template local encontrado");
        return Ok(found);
    }

    tracing::warn!(pattern, fallback, "nenhum template local; baixando");
    store.refresh_catalog()?;
    store.download_template(fallback)?;

    first_match(store.list_templates()?, pattern).ok_or_else(|| {
        ProvisionError::TemplateNotFound {
            pattern: pattern.to_string(),
        }
        .into()
    })
}

// A ordem é a do backend, não lexicográfica
fn first_match(templates: Vec<String>, pattern: &str) -> Option<TemplateReference> {
    templates
        .into_iter()
        .find(|t| t.contains(pattern))
        .map(TemplateReference)
}
