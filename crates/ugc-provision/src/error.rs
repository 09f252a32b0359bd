//! Erros tipados do provisionamento.
//!
//! A propagação geral usa `anyhow`; estas variantes existem para as condições
//! que o chamador precisa distinguir (timeout de rede, template ausente etc).

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Comando do backend terminou com status diferente de zero.
    /// `stderr` é repassado sem tradução.
    #[error("`{command}` terminou com status {status}\n{stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("nenhum template contendo '{pattern}' disponível, mesmo após o download")]
    TemplateNotFound { pattern: String },

    #[error("rede do container '{container}' não ficou pronta após {waited:?} de espera")]
    ReadinessTimeout { container: String, waited: Duration },

    #[error("configuração inválida: {0}")]
    InvalidConfig(String),
}
