//! Adaptador para containers LXC do Proxmox VE (`pct` e `pveam`)

use super::runner::{CommandRunner, ExecOutput, HostCommand, SystemRunner};
use super::{
    remote_join, ContainerBackend, ContainerHandle, PushOptions, ResourceLimit, TemplateStore,
};
use crate::config::ProvisioningSpec;
use crate::error::ProvisionError;
use crate::steps::shell_quote;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

pub struct ProxmoxBackend<R: CommandRunner = SystemRunner> {
    runner: R,
    template_storage: String,
}

impl<R: CommandRunner> ProxmoxBackend<R> {
    pub fn new(runner: R, template_storage: impl Into<String>) -> Self {
        Self {
            runner,
            template_storage: template_storage.into(),
        }
    }

    fn pct(&self) -> HostCommand {
        HostCommand::new("pct")
    }

    fn run_checked(&self, command: HostCommand) -> Result<ExecOutput> {
        let output = self.runner.run(&command)?;
        Ok(output.check(&command.to_string())?)
    }

    /// `pct push` só copia arquivos; diretórios viajam como tar.gz
    fn push_tree(
        &self,
        handle: &ContainerHandle,
        local: &Path,
        remote_dir: &str,
        options: PushOptions,
    ) -> Result<()> {
        let name = local
            .file_name()
            .ok_or_else(|| anyhow!("Caminho sem nome final: '{}'", local.display()))?
            .to_string_lossy()
            .into_owned();
        let parent = match local.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let archive_name = format!("ugc-provision-{handle}-{name}.tar.gz");
        let archive = std::env::temp_dir().join(&archive_name);
        let remote_archive = format!("/tmp/{archive_name}");

        let packed = self
            .run_checked(
                HostCommand::new("tar")
                    .arg("-C")
                    .arg(parent.to_string_lossy())
                    .arg("-czf")
                    .arg(archive.to_string_lossy())
                    .arg(&name),
            )
            .and_then(|_| {
                self.run_checked(
                    self.pct()
                        .args(["push", handle.as_str()])
                        .arg(archive.to_string_lossy())
                        .arg(&remote_archive),
                )
            });
        // o arquivo local é descartável com ou sem sucesso
        let _ = fs::remove_file(&archive);
        packed.with_context(|| format!("Falha ao empacotar/enviar '{}'", local.display()))?;

        let owner = if options.preserve_permissions {
            "--same-owner -p"
        } else {
            "--no-same-owner"
        };
        let script = format!(
            "tar -xzf {archive} -C {dir} {owner} && rm -f {archive}",
            archive = shell_quote(&remote_archive),
            dir = shell_quote(remote_dir),
        );
        self.exec(handle, &script)?
            .check("tar -xzf")
            .with_context(|| format!("Falha ao extrair '{}' no container", name))?;
        Ok(())
    }
}

impl<R: CommandRunner> ContainerBackend for ProxmoxBackend<R> {
    fn name(&self) -> &'static str {
        "pve"
    }

    fn exists(&self, container: &str) -> Result<bool> {
        let output = self.runner.run(&self.pct().arg("status").arg(container))?;
        Ok(output.success())
    }

    fn create(&self, spec: &ProvisioningSpec, image: &str) -> Result<ContainerHandle> {
        let hv = spec.hypervisor.as_ref().ok_or_else(|| {
            ProvisionError::InvalidConfig("parâmetros do Proxmox ausentes".to_string())
        })?;

        let mut create = self
            .pct()
            .args(["create", spec.container.as_str(), image])
            .args(["--hostname", spec.hostname.as_str()])
            .arg("--memory")
            .arg(spec.memory_mib.to_string())
            .arg("--cores")
            .arg(spec.cpus.to_string())
            .arg("--rootfs")
            .arg(format!("{}:{}", hv.storage, hv.disk_gb));
        if let Some(network) = &spec.network {
            create = create.arg("--net0").arg(network);
        }
        create = create.args(["--unprivileged", "1", "--features", "nesting=1"]);
        if let Some(password) = &hv.root_password {
            create = create.arg("--password").secret_arg(password);
        }

        self.run_checked(create)
            .with_context(|| format!("Falha ao criar container {}", spec.container))?;
        Ok(ContainerHandle::new(&spec.container))
    }

    fn needs_start(&self) -> bool {
        true
    }

    fn start(&self, handle: &ContainerHandle) -> Result<()> {
        self.run_checked(self.pct().args(["start", handle.as_str()]))
            .with_context(|| format!("Falha ao iniciar container {handle}"))?;
        Ok(())
    }

    fn set_resource_limit(&self, handle: &ContainerHandle, limit: ResourceLimit) -> Result<()> {
        let (flag, value) = match limit {
            ResourceLimit::MemoryMib(mib) => ("--memory", mib.to_string()),
            ResourceLimit::Cpus(cpus) => ("--cores", cpus.to_string()),
        };
        self.run_checked(self.pct().args(["set", handle.as_str(), flag]).arg(value))?;
        Ok(())
    }

    fn exec(&self, handle: &ContainerHandle, script: &str) -> Result<ExecOutput> {
        self.runner.run(
            &self
                .pct()
                .args(["exec", handle.as_str(), "--", "bash", "-c", script]),
        )
    }

    fn push_file(
        &self,
        handle: &ContainerHandle,
        local: &Path,
        remote_dir: &str,
        options: PushOptions,
    ) -> Result<()> {
        if options.recursive {
            return self.push_tree(handle, local, remote_dir, options);
        }

        let name = local
            .file_name()
            .ok_or_else(|| anyhow!("Caminho sem nome final: '{}'", local.display()))?
            .to_string_lossy()
            .into_owned();
        let mut push = self
            .pct()
            .args(["push", handle.as_str()])
            .arg(local.to_string_lossy())
            .arg(remote_join(remote_dir, &name));
        if options.preserve_permissions {
            if let Some(mode) = file_mode(local) {
                push = push.arg("--perms").arg(format!("{mode:o}"));
            }
        }
        self.run_checked(push)
            .with_context(|| format!("Falha ao enviar '{}'", local.display()))?;
        Ok(())
    }

    fn destroy(&self, handle: &ContainerHandle) -> Result<()> {
        // pode já estar parado; só o destroy decide
        let _ = self.runner.run(&self.pct().args(["stop", handle.as_str()]))?;
        self.run_checked(self.pct().args(["destroy", handle.as_str()]))?;
        Ok(())
    }

    fn templates(&self) -> Option<&dyn TemplateStore> {
        Some(self)
    }

    fn shell_hint(&self, handle: &ContainerHandle) -> String {
        format!("pct enter {handle}")
    }
}

impl<R: CommandRunner> TemplateStore for ProxmoxBackend<R> {
    fn list_templates(&self) -> Result<Vec<String>> {
        let output = self.run_checked(
            HostCommand::new("pveam")
                .arg("list")
                .arg(&self.template_storage),
        )?;
        Ok(parse_template_list(&output.stdout))
    }

    fn refresh_catalog(&self) -> Result<()> {
        self.run_checked(HostCommand::new("pveam").arg("update"))
            .context("Falha ao atualizar catálogo de templates")?;
        Ok(())
    }

    fn download_template(&self, name: &str) -> Result<()> {
        self.run_checked(
            HostCommand::new("pveam")
                .arg("download")
                .arg(&self.template_storage)
                .arg(name),
        )
        .with_context(|| format!("Falha ao baixar template '{name}'"))?;
        Ok(())
    }
}

/// Extrai os volids da saída de `pveam list`, mantendo a ordem listada
fn parse_template_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|volid| *volid != "NAME")
        .map(str::to_string)
        .collect()
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}
