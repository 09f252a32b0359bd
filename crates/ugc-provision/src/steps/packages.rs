//! Dependências de sistema instaladas via apt dentro do container

use crate::backend::{ContainerBackend, ContainerHandle};
use anyhow::{Context, Result};

/// Runtime Python, ffmpeg para o vídeo, git, curl e a libGL que o ffmpeg exige
pub const DEFAULT_PACKAGES: &[&str] = &[
    "python3",
    "python3-pip",
    "python3-venv",
    "ffmpeg",
    "git",
    "curl",
    "libgl1",
];

/// Nunca pode parar num prompt: frontend não interativo e configs antigas mantidas
pub fn install_script(packages: &[String]) -> String {
    format!(
        "set -e\n\
         export DEBIAN_FRONTEND=noninteractive\n\
         apt-get update -q\n\
         apt-get install -y -q -o Dpkg::Options::=--force-confdef -o Dpkg::Options::=--force-confold {}\n",
        packages.join(" ")
    )
}

pub fn install_packages<B: ContainerBackend + ?Sized>(
    backend: &B,
    handle: &ContainerHandle,
    packages: &[String],
) -> Result<()> {
    backend
        .exec(handle, &install_script(packages))?
        .check("apt-get install")
        .context("Falha ao instalar dependências do sistema")?;
    tracing::info!(container = %handle, count = packages.len(), "pacotes instalados");
    Ok(())
}
