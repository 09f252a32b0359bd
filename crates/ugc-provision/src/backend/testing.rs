//! Dublês de teste: executor com respostas roteirizadas e backend em memória

use super::runner::{CommandRunner, ExecOutput, HostCommand};
use super::{ContainerBackend, ContainerHandle, PushOptions, ResourceLimit, TemplateStore};
use crate::config::ProvisioningSpec;
use crate::error::ProvisionError;
use anyhow::Result;
use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

impl ExecOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            status: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: i32, stderr: &str) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

/// Registra os comandos recebidos e responde por substring da linha de comando.
/// Sem regra correspondente, responde sucesso com saída vazia.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: RefCell<Vec<(String, ExecOutput)>>,
    calls: RefCell<Vec<HostCommand>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A primeira regra cadastrada que casar vence
    pub fn respond(&self, needle: &str, output: ExecOutput) {
        self.rules.borrow_mut().push((needle.to_string(), output));
    }

    pub fn calls(&self) -> Vec<HostCommand> {
        self.calls.borrow().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(ToString::to_string).collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &HostCommand) -> Result<ExecOutput> {
        self.calls.borrow_mut().push(command.clone());
        let line = command.to_string();
        let output = self
            .rules
            .borrow()
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists(String),
    Create { image: String },
    Start,
    Limit(ResourceLimit),
    Hostname(String),
    Exec(String),
    Push {
        local: PathBuf,
        remote_dir: String,
        options: PushOptions,
    },
    Destroy,
}

/// Templates em memória: `listed` antes do download, `after_download` depois
pub struct FakeTemplates {
    listed: RefCell<Vec<String>>,
    after_download: Vec<String>,
    pub refreshes: Cell<u32>,
    pub downloads: RefCell<Vec<String>>,
}

impl FakeTemplates {
    pub fn new(listed: &[&str], after_download: &[&str]) -> Self {
        Self {
            listed: RefCell::new(listed.iter().map(|s| s.to_string()).collect()),
            after_download: after_download.iter().map(|s| s.to_string()).collect(),
            refreshes: Cell::new(0),
            downloads: RefCell::new(Vec::new()),
        }
    }
}

impl TemplateStore for FakeTemplates {
    fn list_templates(&self) -> Result<Vec<String>> {
        Ok(self.listed.borrow().clone())
    }

    fn refresh_catalog(&self) -> Result<()> {
        self.refreshes.set(self.refreshes.get() + 1);
        Ok(())
    }

    fn download_template(&self, name: &str) -> Result<()> {
        self.downloads.borrow_mut().push(name.to_string());
        *self.listed.borrow_mut() = self.after_download.clone();
        Ok(())
    }
}

/// Backend em memória com contagem de chamadas e injeção de falhas
pub struct FakeBackend {
    needs_start: bool,
    existing: RefCell<HashSet<String>>,
    calls: RefCell<Vec<Call>>,
    exec_rules: RefCell<Vec<(String, VecDeque<ExecOutput>)>>,
    limits: RefCell<(Option<u64>, Option<u32>)>,
    fail_limits: Cell<bool>,
    fail_hostname: Cell<bool>,
    fail_push: Cell<bool>,
    pub templates: Option<FakeTemplates>,
}

impl FakeBackend {
    /// Comporta-se como o LXD: `create` já deixa o container rodando
    pub fn lxd() -> Self {
        Self {
            needs_start: false,
            existing: RefCell::new(HashSet::new()),
            calls: RefCell::new(Vec::new()),
            exec_rules: RefCell::new(Vec::new()),
            limits: RefCell::new((None, None)),
            fail_limits: Cell::new(false),
            fail_hostname: Cell::new(false),
            fail_push: Cell::new(false),
            templates: None,
        }
    }

    /// Comporta-se como o Proxmox: exige `start` e resolve templates
    pub fn proxmox(templates: FakeTemplates) -> Self {
        Self {
            needs_start: true,
            templates: Some(templates),
            ..Self::lxd()
        }
    }

    pub fn with_existing(self, container: &str) -> Self {
        self.existing.borrow_mut().insert(container.to_string());
        self
    }

    /// Scripts contendo `needle` recebem `output`
    pub fn on_exec(&self, needle: &str, output: ExecOutput) {
        self.on_exec_sequence(needle, vec![output]);
    }

    /// Respostas consumidas em ordem; a última se repete
    pub fn on_exec_sequence(&self, needle: &str, outputs: Vec<ExecOutput>) {
        self.exec_rules
            .borrow_mut()
            .push((needle.to_string(), outputs.into()));
    }

    pub fn fail_limits(&self) {
        self.fail_limits.set(true);
    }

    pub fn fail_hostname(&self) {
        self.fail_hostname.set(true);
    }

    pub fn fail_push(&self) {
        self.fail_push.set(true);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| predicate(c)).count()
    }

    /// Estado final dos limites: `(memória em MiB, CPUs)`
    pub fn configured_limits(&self) -> (Option<u64>, Option<u32>) {
        *self.limits.borrow()
    }

    pub fn execs(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Exec(script) => Some(script.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

fn command_failed(command: &str) -> anyhow::Error {
    ProvisionError::CommandFailed {
        command: command.to_string(),
        status: 1,
        stderr: "falha simulada".to_string(),
    }
    .into()
}

impl ContainerBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn exists(&self, container: &str) -> Result<bool> {
        self.record(Call::Exists(container.to_string()));
        Ok(self.existing.borrow().contains(container))
    }

    fn create(&self, spec: &ProvisioningSpec, image: &str) -> Result<ContainerHandle> {
        self.record(Call::Create {
            image: image.to_string(),
        });
        self.existing.borrow_mut().insert(spec.container.clone());
        Ok(ContainerHandle::new(&spec.container))
    }

    fn needs_start(&self) -> bool {
        self.needs_start
    }

    fn start(&self, _handle: &ContainerHandle) -> Result<()> {
        self.record(Call::Start);
        Ok(())
    }

    fn set_resource_limit(&self, _handle: &ContainerHandle, limit: ResourceLimit) -> Result<()> {
        self.record(Call::Limit(limit));
        if self.fail_limits.get() {
            return Err(command_failed("set limit"));
        }
        let mut limits = self.limits.borrow_mut();
        match limit {
            ResourceLimit::MemoryMib(mib) => limits.0 = Some(mib),
            ResourceLimit::Cpus(cpus) => limits.1 = Some(cpus),
        }
        Ok(())
    }

    fn set_hostname(&self, _handle: &ContainerHandle, hostname: &str) -> Result<()> {
        self.record(Call::Hostname(hostname.to_string()));
        if self.fail_hostname.get() {
            return Err(command_failed("hostnamectl"));
        }
        Ok(())
    }

    fn exec(&self, _handle: &ContainerHandle, script: &str) -> Result<ExecOutput> {
        self.record(Call::Exec(script.to_string()));
        let mut rules = self.exec_rules.borrow_mut();
        for (needle, outputs) in rules.iter_mut() {
            if script.contains(needle.as_str()) {
                let output = if outputs.len() > 1 {
                    outputs.pop_front()
                } else {
                    outputs.front().cloned()
                };
                return Ok(output.unwrap_or_default());
            }
        }
        Ok(ExecOutput::default())
    }

    fn push_file(
        &self,
        _handle: &ContainerHandle,
        local: &Path,
        remote_dir: &str,
        options: PushOptions,
    ) -> Result<()> {
        self.record(Call::Push {
            local: local.to_path_buf(),
            remote_dir: remote_dir.to_string(),
            options,
        });
        if self.fail_push.get() {
            return Err(command_failed("push"));
        }
        Ok(())
    }

    fn destroy(&self, handle: &ContainerHandle) -> Result<()> {
        self.record(Call::Destroy);
        self.existing.borrow_mut().remove(handle.as_str());
        Ok(())
    }

    fn templates(&self) -> Option<&dyn TemplateStore> {
        self.templates.as_ref().map(|t| t as &dyn TemplateStore)
    }

    fn shell_hint(&self, handle: &ContainerHandle) -> String {
        format!("fake-shell {handle}")
    }
}
