//! Criação idempotente do container

use super::readiness::Waiter;
use crate::backend::{ContainerBackend, ContainerHandle};
use crate::config::ProvisioningSpec;
use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredContainer {
    pub handle: ContainerHandle,
    /// `false` quando o container já existia
    pub created: bool,
}

/// Reaproveita o container se ele existir; caso contrário cria a partir da
/// imagem devolvida por `resolve_image`, chamada só quando há criação.
pub fn ensure_container<B, F>(
    backend: &B,
    spec: &ProvisioningSpec,
    resolve_image: F,
) -> Result<EnsuredContainer>
where
    B: ContainerBackend + ?Sized,
    F: FnOnce() -> Result<String>,
{
    if backend.exists(&spec.container)? {
        eprintln!("ℹ️  Container '{}' já existe, pulando criação", spec.container);
        tracing::info!(container = %spec.container, "container existente reaproveitado");
        return Ok(EnsuredContainer {
            handle: ContainerHandle::new(&spec.container),
            created: false,
        });
    }

    let image = resolve_image()?;
    let handle = backend
        .create(spec, &image)
        .with_context(|| format!("Falha ao criar container '{}'", spec.container))?;
    tracing::info!(container = %handle, image, backend = backend.name(), "container criado");

    Ok(EnsuredContainer {
        handle,
        created: true,
    })
}

/// Backends que não sobem o container na criação recebem `start` e uma espera
/// pela rede, usada aqui como sinal de que o guest está de pé.
pub fn start_if_needed<B: ContainerBackend + ?Sized>(
    backend: &B,
    ensured: &EnsuredContainer,
    waiter: &Waiter<'_>,
) -> Result<()> {
    if !ensured.created || !backend.needs_start() {
        return Ok(());
    }
    backend.start(&ensured.handle)?;
    waiter.await_network(backend, &ensured.handle)
}
