//! Ambiente Python isolado (venv) com as dependências da aplicação

use crate::backend::{ContainerBackend, ContainerHandle};
use crate::steps::shell_quote;
use anyhow::{Context, Result};

pub const VENV_DIR: &str = "venv";
pub const REQUIREMENTS: &str = "requirements.txt";

/// Uma única transação remota: a ativação do venv só vale dentro dela.
/// Um venv existente é reaproveitado. Sem código implantado o diretório é
/// criado e o venv fica pronto, aguardando o `requirements.txt`.
pub fn bootstrap_script(project_path: &str) -> String {
    format!(
        "set -e\n\
         mkdir -p {path}\n\
         cd {path}\n\
         [ -d {VENV_DIR} ] || python3 -m venv {VENV_DIR}\n\
         . {VENV_DIR}/bin/activate\n\
         pip install --upgrade pip\n\
         if [ -f {REQUIREMENTS} ]; then\n\
         \x20 pip install -r {REQUIREMENTS}\n\
         else\n\
         \x20 echo '{REQUIREMENTS} ausente; dependências aguardam a implantação do código' >&2\n\
         fi\n",
        path = shell_quote(project_path),
    )
}

pub fn bootstrap_runtime<B: ContainerBackend + ?Sized>(
    backend: &B,
    handle: &ContainerHandle,
    project_path: &str,
) -> Result<()> {
    backend
        .exec(handle, &bootstrap_script(project_path))?
        .check("python3 -m venv / pip install")
        .context("Falha ao preparar o ambiente Python")?;
    tracing::info!(container = %handle, project_path, "ambiente Python pronto");
    Ok(())
}
