//! Implantação do código da aplicação no container.
//!
//! Push de diretório local é fatal em caso de erro: uma árvore parcial é pior
//! do que parar. Clone dentro do container é a única etapa não fatal do
//! pipeline; a falha vira aviso e o operador implanta manualmente.

use crate::backend::{ContainerBackend, ContainerHandle, PushOptions};
use crate::config::DeploySource;
use crate::steps::shell_quote;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Entradas locais que não fazem sentido dentro do container
const EXCLUDED: &[&str] = &[
    ".git",
    ".env",
    "venv",
    ".venv",
    "__pycache__",
    "output",
    "target",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeployOutcome {
    Pushed { entries: usize },
    Cloned { repo_url: String },
    /// Clone falhou ou não estava configurado
    Skipped { reason: String },
}

pub fn deploy_code<B: ContainerBackend + ?Sized>(
    backend: &B,
    handle: &ContainerHandle,
    source: &DeploySource,
    target_path: &str,
) -> Result<DeployOutcome> {
    match source {
        DeploySource::Push { local_dir } => push_tree(backend, handle, local_dir, target_path),
        DeploySource::Clone { repo_url } => Ok(clone_repo(
            backend,
            handle,
            repo_url.as_deref(),
            target_path,
        )),
    }
}

fn push_tree<B: ContainerBackend + ?Sized>(
    backend: &B,
    handle: &ContainerHandle,
    local_dir: &Path,
    target_path: &str,
) -> Result<DeployOutcome> {
    let entries = local_entries(local_dir)?;
    if entries.is_empty() {
        bail!(
            "Nada para implantar em '{}' (diretório vazio ou só com entradas ignoradas)",
            local_dir.display()
        );
    }

    // o destino tem que existir antes do primeiro push
    backend
        .exec(handle, &format!("mkdir -p {}", shell_quote(target_path)))?
        .check("mkdir -p")
        .context("Falha ao criar diretório de destino")?;

    for entry in &entries {
        let options = PushOptions {
            recursive: entry.is_dir(),
            preserve_permissions: true,
        };
        backend.push_file(handle, entry, target_path, options)?;
    }

    tracing::info!(container = %handle, entries = entries.len(), target_path, "código enviado");
    Ok(DeployOutcome::Pushed {
        entries: entries.len(),
    })
}

/// Entradas de primeiro nível, ordenadas por nome, sem as excluídas
fn local_entries(local_dir: &Path) -> Result<Vec<PathBuf>> {
    let reader = fs::read_dir(local_dir)
        .with_context(|| format!("Falha ao ler diretório de origem '{}'", local_dir.display()))?;

    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.context("Falha ao listar diretório de origem")?;
        let name = entry.file_name();
        if name.to_str().is_some_and(|n| EXCLUDED.contains(&n)) {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

fn clone_repo<B: ContainerBackend + ?Sized>(
    backend: &B,
    handle: &ContainerHandle,
    repo_url: Option<&str>,
    target_path: &str,
) -> DeployOutcome {
    let Some(repo_url) = repo_url else {
        let reason = "repositório não configurado ([deploy] repo_url)".to_string();
        eprintln!("⚠️  {reason}; implante o código manualmente");
        tracing::warn!("{reason}");
        return DeployOutcome::Skipped { reason };
    };

    match backend.exec(handle, &clone_script(repo_url, target_path)) {
        Ok(output) if output.success() => {
            tracing::info!(container = %handle, repo_url, target_path, "repositório clonado");
            DeployOutcome::Cloned {
                repo_url: repo_url.to_string(),
            }
        }
        Ok(output) => {
            let reason = format!(
                "git terminou com status {}: {}",
                output.status,
                output.stderr.trim()
            );
            eprintln!("⚠️  Clone falhou ({reason}); implante o código manualmente");
            tracing::warn!(repo_url, "{reason}");
            DeployOutcome::Skipped { reason }
        }
        Err(err) => {
            let reason = format!("{err:#}");
            eprintln!("⚠️  Clone falhou ({reason}); implante o código manualmente");
            tracing::warn!(repo_url, "{reason}");
            DeployOutcome::Skipped { reason }
        }
    }
}

/// Checkout existente recebe fast-forward em vez de um novo clone
fn clone_script(repo_url: &str, target_path: &str) -> String {
    let target = shell_quote(target_path);
    format!(
        "set -e\n\
         if [ -d {target}/.git ]; then\n\
         \x20 git -C {target} pull --ff-only\n\
         else\n\
         \x20 mkdir -p \"$(dirname {target})\"\n\
         \x20 git clone {url} {target}\n\
         fi\n",
        url = shell_quote(repo_url),
    )
}
