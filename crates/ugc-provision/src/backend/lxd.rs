//! Adaptador para o LXD local (`lxc`)

use super::runner::{CommandRunner, ExecOutput, HostCommand, SystemRunner};
use super::{ContainerBackend, ContainerHandle, PushOptions, ResourceLimit};
use crate::config::ProvisioningSpec;
use crate::steps::shell_quote;
use anyhow::{Context, Result};
use std::path::Path;

pub struct LxdBackend<R: CommandRunner = SystemRunner> {
    runner: R,
}

impl<R: CommandRunner> LxdBackend<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn lxc(&self) -> HostCommand {
        HostCommand::new("lxc")
    }

    fn run_checked(&self, command: HostCommand) -> Result<ExecOutput> {
        let output = self.runner.run(&command)?;
        Ok(output.check(&command.to_string())?)
    }
}

impl<R: CommandRunner> ContainerBackend for LxdBackend<R> {
    fn name(&self) -> &'static str {
        "lxd"
    }

    fn exists(&self, container: &str) -> Result<bool> {
        let output = self.runner.run(&self.lxc().arg("info").arg(container))?;
        Ok(output.success())
    }

    fn create(&self, spec: &ProvisioningSpec, image: &str) -> Result<ContainerHandle> {
        let mut launch = self.lxc().arg("launch").arg(image).arg(&spec.container);
        if let Some(network) = &spec.network {
            launch = launch.arg("--network").arg(network);
        }
        self.run_checked(launch)
            .with_context(|| format!("Falha ao criar container '{}'", spec.container))?;

        Ok(ContainerHandle::new(&spec.container))
    }

    fn set_resource_limit(&self, handle: &ContainerHandle, limit: ResourceLimit) -> Result<()> {
        let (key, value) = match limit {
            ResourceLimit::MemoryMib(mib) => ("limits.memory", format!("{mib}MiB")),
            ResourceLimit::Cpus(cpus) => ("limits.cpu", cpus.to_string()),
        };
        self.run_checked(
            self.lxc()
                .args(["config", "set", handle.as_str(), key])
                .arg(value),
        )?;
        Ok(())
    }

    /// O LXD usa o nome da instância como hostname; um nome diferente só
    /// pode ser aplicado de dentro do guest, com o systemd já no ar.
    fn set_hostname(&self, handle: &ContainerHandle, hostname: &str) -> Result<()> {
        if hostname == handle.as_str() {
            return Ok(());
        }
        let script = format!("hostnamectl set-hostname {}", shell_quote(hostname));
        self.exec(handle, &script)?
            .check("hostnamectl set-hostname")
            .context("Falha ao definir hostname")?;
        Ok(())
    }

    fn exec(&self, handle: &ContainerHandle, script: &str) -> Result<ExecOutput> {
        self.runner.run(
            &self
                .lxc()
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
        let mut push = self.lxc().args(["file", "push"]);
        if options.recursive {
            push = push.arg("-r");
        }
        // -p cria diretórios intermediários
        push = push.arg("-p");
        if !options.preserve_permissions {
            push = push.args(["--uid", "0", "--gid", "0"]);
        }
        let target = format!("{}{}/", handle, remote_dir.trim_end_matches('/'));
        self.run_checked(push.arg(local.to_string_lossy()).arg(target))
            .with_context(|| format!("Falha ao enviar '{}'", local.display()))?;
        Ok(())
    }

    fn destroy(&self, handle: &ContainerHandle) -> Result<()> {
        self.run_checked(self.lxc().args(["delete", "--force", handle.as_str()]))?;
        Ok(())
    }

    fn shell_hint(&self, handle: &ContainerHandle) -> String {
        format!("lxc exec {handle} -- bash")
    }
}
