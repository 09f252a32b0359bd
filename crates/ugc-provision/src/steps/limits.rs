use crate::backend::{ContainerBackend, ContainerHandle, ResourceLimit};
use anyhow::{Context, Result};

/// Memória e depois CPU, em chamadas independentes. Se a segunda falhar a
/// primeira já ficou aplicada.
pub fn apply_limits<B: ContainerBackend + ?Sized>(
    backend: &B,
    handle: &ContainerHandle,
    memory_mib: u64,
    cpus: u32,
) -> Result<()> {
    backend
        .set_resource_limit(handle, ResourceLimit::MemoryMib(memory_mib))
        .context("Falha ao aplicar limite de memória")?;
    backend
        .set_resource_limit(handle, ResourceLimit::Cpus(cpus))
        .context("Falha ao aplicar limite de CPU")?;
    tracing::info!(container = %handle, memory_mib, cpus, "limites aplicados");
    Ok(())
}
