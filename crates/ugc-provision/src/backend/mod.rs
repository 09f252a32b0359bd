//! Adaptadores de backend de containers.
//!
//! O orquestrador conhece apenas [`ContainerBackend`]; cada adaptador traduz
//! as operações abstratas (criar, configurar, iniciar, executar, enviar
//! arquivo) para a CLI concreta do backend: `lxc` no LXD local, `pct` e
//! `pveam` no Proxmox VE.

pub mod lxd;
pub mod proxmox;
pub mod runner;
#[cfg(test)]
pub mod testing;

pub use lxd::LxdBackend;
pub use proxmox::ProxmoxBackend;
pub use runner::{ExecOutput, SystemRunner};

use crate::config::ProvisioningSpec;
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Identificador do container no backend (nome no LXD, VMID no Proxmox)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLimit {
    MemoryMib(u64),
    Cpus(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushOptions {
    pub recursive: bool,
    pub preserve_permissions: bool,
}

/// Conjunto de capacidades que o orquestrador exige de um backend
pub trait ContainerBackend {
    /// Nome curto usado em logs e relatórios
    fn name(&self) -> &'static str;

    fn exists(&self, container: &str) -> Result<bool>;

    /// Cria o container a partir de `image` (alias de imagem no LXD,
    /// volid do template no Proxmox).
    fn create(&self, spec: &ProvisioningSpec, image: &str) -> Result<ContainerHandle>;

    /// Se o container precisa de um `start` explícito após a criação.
    /// No LXD, `launch` já devolve o container rodando.
    fn needs_start(&self) -> bool {
        false
    }

    fn start(&self, _handle: &ContainerHandle) -> Result<()> {
        Ok(())
    }

    fn set_resource_limit(&self, handle: &ContainerHandle, limit: ResourceLimit) -> Result<()>;

    /// Ajusta o hostname do guest depois que ele está de pé. Backends que
    /// recebem o hostname na criação não fazem nada.
    fn set_hostname(&self, _handle: &ContainerHandle, _hostname: &str) -> Result<()> {
        Ok(())
    }

    /// Executa `script` em `bash -c` dentro do container. Status diferente
    /// de zero não é erro aqui; quem chama decide se é fatal.
    fn exec(&self, handle: &ContainerHandle, script: &str) -> Result<ExecOutput>;

    /// Copia `local` para dentro do diretório `remote_dir` do container,
    /// mantendo o nome do arquivo/diretório de origem.
    fn push_file(
        &self,
        handle: &ContainerHandle,
        local: &Path,
        remote_dir: &str,
        options: PushOptions,
    ) -> Result<()>;

    fn destroy(&self, handle: &ContainerHandle) -> Result<()>;

    /// Repositório de templates; só o Proxmox precisa resolver um antes de criar
    fn templates(&self) -> Option<&dyn TemplateStore> {
        None
    }

    /// Comando que o operador usa para abrir um shell no container
    fn shell_hint(&self, handle: &ContainerHandle) -> String;
}

/// Repositório local de templates de SO
pub trait TemplateStore {
    /// Templates disponíveis localmente, na ordem listada pelo backend
    fn list_templates(&self) -> Result<Vec<String>>;

    fn refresh_catalog(&self) -> Result<()>;

    fn download_template(&self, name: &str) -> Result<()>;
}

/// Junta diretório remoto e nome de entrada sem barras duplicadas
pub(crate) fn remote_join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}
