//! Sequenciamento do provisionamento.
//!
//! Ordem fixa, uma etapa por vez, parando na primeira falha fatal:
//! container → limites → rede → pacotes → código → venv.

use crate::backend::{ContainerBackend, ContainerHandle};
use crate::config::{FailurePolicy, ProvisioningSpec};
use crate::steps::deploy::{deploy_code, DeployOutcome};
use crate::steps::lifecycle::{ensure_container, start_if_needed, EnsuredContainer};
use crate::steps::limits::apply_limits;
use crate::steps::packages::install_packages;
use crate::steps::readiness::{Sleeper, Waiter};
use crate::steps::runtime_env::bootstrap_runtime;
use crate::steps::template::{resolve_template, TemplateReference};
use anyhow::{Context, Result};
use serde::Serialize;

const STEPS: usize = 6;

/// Resultado de uma execução completa
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub backend: &'static str,
    pub container: ContainerHandle,
    pub created: bool,
    pub template: Option<TemplateReference>,
    pub deploy: DeployOutcome,
    pub project_path: String,
    pub address: Option<String>,
    pub shell: String,
}

pub struct Provisioner<'a, B: ContainerBackend + ?Sized> {
    backend: &'a B,
    spec: &'a ProvisioningSpec,
    sleeper: &'a dyn Sleeper,
    progress: bool,
}

impl<'a, B: ContainerBackend + ?Sized> Provisioner<'a, B> {
    pub fn new(backend: &'a B, spec: &'a ProvisioningSpec, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            backend,
            spec,
            sleeper,
            progress: true,
        }
    }

    /// Desliga as linhas de progresso no stdout (saída JSON)
    pub fn quiet(mut self) -> Self {
        self.progress = false;
        self
    }

    pub fn run(&self) -> Result<ProvisionReport> {
        let spec = self.spec;
        let waiter = Waiter::new(&spec.readiness, self.sleeper);
        let mut template = None;

        let ensured = self.step(1, "Garantindo container", || {
            ensure_container(self.backend, spec, || self.resolve_image(&mut template))
        })?;

        match self.configure(&ensured, &waiter) {
            Ok(deploy) => Ok(ProvisionReport {
                backend: self.backend.name(),
                address: self.discover_address(&ensured.handle),
                shell: self.backend.shell_hint(&ensured.handle),
                container: ensured.handle,
                created: ensured.created,
                template,
                deploy,
                project_path: spec.target_path.clone(),
            }),
            Err(err) => {
                self.handle_failure(&ensured);
                Err(err)
            }
        }
    }

    /// Tudo que vem depois de o container existir
    fn configure(&self, ensured: &EnsuredContainer, waiter: &Waiter<'_>) -> Result<DeployOutcome> {
        let spec = self.spec;
        let handle = &ensured.handle;

        start_if_needed(self.backend, ensured, waiter)?;

        self.step(2, "Aplicando limites de memória e CPU", || {
            apply_limits(self.backend, handle, spec.memory_mib, spec.cpus)
        })?;
        self.step(3, "Aguardando rede do container", || {
            waiter.await_network(self.backend, handle)?;
            if ensured.created {
                self.backend.set_hostname(handle, &spec.hostname)?;
            }
            Ok(())
        })?;
        self.step(4, "Instalando dependências do sistema", || {
            install_packages(self.backend, handle, &spec.packages)
        })?;
        let deploy = self.step(5, "Implantando código da aplicação", || {
            deploy_code(self.backend, handle, &spec.deploy, &spec.target_path)
        })?;
        self.step(6, "Preparando ambiente Python", || {
            bootstrap_runtime(self.backend, handle, &spec.target_path)
        })?;

        Ok(deploy)
    }

    fn step<T>(&self, n: usize, label: &str, run: impl FnOnce() -> Result<T>) -> Result<T> {
        if self.progress {
            println!("[{n}/{STEPS}] {label}...");
        }
        let _span = tracing::info_span!("step", n, label).entered();
        run()
    }

    fn resolve_image(&self, template: &mut Option<TemplateReference>) -> Result<String> {
        let Some(store) = self.backend.templates() else {
            return Ok(self.spec.image.clone());
        };
        let hv = self.spec.hypervisor.as_ref().context(
            "Backend exige template mas a configuração não tem parâmetros do hypervisor",
        )?;

        let found = resolve_template(store, &hv.template_pattern, &hv.default_template)?;
        let image = found.as_str().to_string();
        *template = Some(found);
        Ok(image)
    }

    fn handle_failure(&self, ensured: &EnsuredContainer) {
        if self.spec.on_failure != FailurePolicy::Teardown || !ensured.created {
            tracing::warn!(
                container = %ensured.handle,
                "estado parcial preservado para inspeção"
            );
            return;
        }

        tracing::warn!(container = %ensured.handle, "removendo container criado nesta execução");
        if let Err(err) = self.backend.destroy(&ensured.handle) {
            tracing::error!(container = %ensured.handle, "falha ao remover container: {err:#}");
        }
    }

    /// Primeiro endereço de `hostname -I`; ausência não é erro
    fn discover_address(&self, handle: &ContainerHandle) -> Option<String> {
        match self.backend.exec(handle, "hostname -I") {
            Ok(out) if out.success() => out.stdout.split_whitespace().next().map(str::to_string),
            Ok(out) => {
                tracing::debug!(status = out.status, "hostname -I falhou");
                None
            }
            Err(err) => {
                tracing::debug!("hostname -I indisponível: {err:#}");
                None
            }
        }
    }
}
