//! Configuração do provisionamento.
//!
//! Padrões por backend, sobrescritos por um TOML opcional e por fim pelo
//! identificador posicional da linha de comando. O resultado é validado uma
//! única vez e passado por referência a todas as etapas.

use crate::error::ProvisionError;
use crate::steps::packages::DEFAULT_PACKAGES;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TARGET_PATH: &str = "/opt/uxai-ugc-agent";

/// Limiares de memória livre da aplicação: abaixo do crítico ela pausa o pipeline
const MEMORY_CRITICAL_MIB: u64 = 300;
const MEMORY_WARNING_MIB: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Lxd,
    Proxmox,
}

impl BackendKind {
    fn default_container(self) -> &'static str {
        match self {
            BackendKind::Lxd => "uxai-ugc",
            BackendKind::Proxmox => "205",
        }
    }

    fn default_network(self) -> Option<String> {
        match self {
            // perfil default do LXD
            BackendKind::Lxd => None,
            BackendKind::Proxmox => Some("name=eth0,bridge=vmbr0,ip=dhcp".to_string()),
        }
    }

    fn default_strategy(self) -> DeployStrategy {
        match self {
            BackendKind::Lxd => DeployStrategy::Push,
            BackendKind::Proxmox => DeployStrategy::Clone,
        }
    }
}

/// Como decidir que a rede do container está utilizável
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ReadinessPolicy {
    /// Espera fixa, sem verificação
    Fixed {
        #[serde(default = "default_fixed_delay_secs")]
        delay_secs: u64,
    },
    /// Sonda DNS dentro do container com backoff exponencial
    Probe {
        #[serde(default = "default_probe_host")]
        probe_host: String,
        #[serde(default = "default_initial_backoff_ms")]
        initial_backoff_ms: u64,
        #[serde(default = "default_max_backoff_secs")]
        max_backoff_secs: u64,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        ReadinessPolicy::Probe {
            probe_host: default_probe_host(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_fixed_delay_secs() -> u64 {
    10
}

fn default_probe_host() -> String {
    "archive.ubuntu.com".to_string()
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_secs() -> u64 {
    8
}

fn default_timeout_secs() -> u64 {
    60
}

/// O que fazer com um container criado nesta execução quando uma etapa falha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Mantém o estado parcial para inspeção
    #[default]
    Preserve,
    /// Destrói o container recém-criado
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStrategy {
    Push,
    Clone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploySource {
    /// Envia um diretório local para dentro do container
    Push { local_dir: PathBuf },
    /// Clona o repositório dentro do container. `None` = não configurado.
    Clone { repo_url: Option<String> },
}

/// Parâmetros exclusivos do caminho Proxmox
#[derive(Clone, PartialEq, Eq)]
pub struct HypervisorSpec {
    pub storage: String,
    pub disk_gb: u32,
    pub template_storage: String,
    pub template_pattern: String,
    pub default_template: String,
    pub root_password: Option<String>,
}

impl fmt::Debug for HypervisorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HypervisorSpec")
            .field("storage", &self.storage)
            .field("disk_gb", &self.disk_gb)
            .field("template_storage", &self.template_storage)
            .field("template_pattern", &self.template_pattern)
            .field("default_template", &self.default_template)
            .field("root_password", &self.root_password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Configuração imutável de uma execução
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningSpec {
    pub backend: BackendKind,
    pub container: String,
    pub hostname: String,
    pub memory_mib: u64,
    pub cpus: u32,
    /// Alias de imagem do LXD; no Proxmox a imagem vem do template resolvido
    pub image: String,
    pub network: Option<String>,
    pub packages: Vec<String>,
    pub deploy: DeploySource,
    pub target_path: String,
    pub readiness: ReadinessPolicy,
    pub on_failure: FailurePolicy,
    pub hypervisor: Option<HypervisorSpec>,
}

// ---------------------------------------------------------------------------
// Arquivo TOML
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub on_failure: Option<FailurePolicy>,
    pub packages: Option<Vec<String>>,
    pub container: ContainerSection,
    pub proxmox: ProxmoxSection,
    pub deploy: DeploySection,
    pub readiness: Option<ReadinessPolicy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerSection {
    pub id: Option<String>,
    pub hostname: Option<String>,
    pub memory_mb: Option<u64>,
    pub cpus: Option<u32>,
    pub image: Option<String>,
    pub network: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxmoxSection {
    pub storage: Option<String>,
    pub disk_gb: Option<u32>,
    pub template_storage: Option<String>,
    pub template_pattern: Option<String>,
    pub default_template: Option<String>,
    pub root_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploySection {
    pub strategy: Option<DeployStrategy>,
    pub source_dir: Option<PathBuf>,
    pub repo_url: Option<String>,
    pub target_path: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Falha ao ler configuração '{}'", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Falha ao parsear configuração '{}'", path.display()))
    }

    /// Usa o arquivo explícito, ou o padrão do usuário se existir
    pub fn discover(explicit: Option<&Path>) -> Result<Option<Self>> {
        if let Some(path) = explicit {
            return Self::load(path).map(Some);
        }

        match default_config_path() {
            Some(path) if path.is_file() => {
                tracing::info!(path = %path.display(), "usando configuração do usuário");
                Self::load(&path).map(Some)
            }
            _ => Ok(None),
        }
    }
}

/// `~/.config/ugc-provision/config.toml` (ou equivalente da plataforma)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ugc-provision").join("config.toml"))
}

// ---------------------------------------------------------------------------
// Resolução e validação
// ---------------------------------------------------------------------------

impl ProvisioningSpec {
    pub fn resolve(
        kind: BackendKind,
        file: Option<FileConfig>,
        container: Option<String>,
    ) -> Result<Self> {
        let FileConfig {
            on_failure,
            packages,
            container: c,
            proxmox: p,
            deploy: d,
            readiness,
        } = file.unwrap_or_default();

        let container = container
            .or(c.id)
            .unwrap_or_else(|| kind.default_container().to_string());

        let deploy = match d.strategy.unwrap_or_else(|| kind.default_strategy()) {
            DeployStrategy::Push => DeploySource::Push {
                local_dir: d.source_dir.unwrap_or_else(|| PathBuf::from(".")),
            },
            DeployStrategy::Clone => DeploySource::Clone {
                repo_url: d.repo_url.filter(|url| !url.trim().is_empty()),
            },
        };

        let hypervisor = match kind {
            BackendKind::Lxd => None,
            BackendKind::Proxmox => Some(HypervisorSpec {
                storage: p.storage.unwrap_or_else(|| "local-lvm".to_string()),
                disk_gb: p.disk_gb.unwrap_or(20),
                template_storage: p.template_storage.unwrap_or_else(|| "local".to_string()),
                template_pattern: p
                    .template_pattern
                    .unwrap_or_else(|| "ubuntu-22.04".to_string()),
                default_template: p.default_template.unwrap_or_else(|| {
                    "ubuntu-22.04-standard_22.04-1_amd64.tar.zst".to_string()
                }),
                root_password: p.root_password.filter(|pw| !pw.is_empty()),
            }),
        };

        let spec = Self {
            backend: kind,
            container,
            hostname: c.hostname.unwrap_or_else(|| "uxai-ugc".to_string()),
            memory_mib: c.memory_mb.unwrap_or(4096),
            cpus: c.cpus.unwrap_or(2),
            image: c.image.unwrap_or_else(|| "ubuntu:22.04".to_string()),
            network: c.network.or_else(|| kind.default_network()),
            packages: packages
                .unwrap_or_else(|| DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect()),
            deploy,
            target_path: d
                .target_path
                .unwrap_or_else(|| DEFAULT_TARGET_PATH.to_string()),
            readiness: readiness.unwrap_or_default(),
            on_failure: on_failure.unwrap_or_default(),
            hypervisor,
        };

        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> std::result::Result<(), ProvisionError> {
        match self.backend {
            BackendKind::Lxd => {
                let valid = self.container.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                    && self
                        .container
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-');
                if !valid {
                    return Err(invalid(format!(
                        "nome de container LXD inválido: '{}'",
                        self.container
                    )));
                }
            }
            BackendKind::Proxmox => match self.container.parse::<u32>() {
                Ok(id) if id >= 100 => {}
                _ => {
                    return Err(invalid(format!(
                        "VMID do Proxmox deve ser numérico e >= 100, recebido '{}'",
                        self.container
                    )))
                }
            },
        }

        if self.hostname.is_empty()
            || !self
                .hostname
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(invalid(format!("hostname inválido: '{}'", self.hostname)));
        }

        if self.cpus == 0 {
            return Err(invalid("cpus deve ser >= 1".to_string()));
        }

        if self.memory_mib < MEMORY_CRITICAL_MIB {
            return Err(invalid(format!(
                "memória de {} MiB abaixo do mínimo de {} MiB",
                self.memory_mib, MEMORY_CRITICAL_MIB
            )));
        }
        if self.memory_mib < MEMORY_WARNING_MIB {
            tracing::warn!(
                memory_mib = self.memory_mib,
                "memória abaixo de {MEMORY_WARNING_MIB} MiB; a aplicação vai operar em alerta"
            );
        }

        if !self.target_path.starts_with('/') || self.target_path.trim_end_matches('/').is_empty() {
            return Err(invalid(format!(
                "caminho de destino deve ser absoluto e diferente de '/': '{}'",
                self.target_path
            )));
        }

        if self.packages.is_empty() {
            return Err(invalid("lista de pacotes vazia".to_string()));
        }
        if let Some(bad) = self.packages.iter().find(|p| !is_package_name(p)) {
            return Err(invalid(format!("nome de pacote inválido: '{bad}'")));
        }

        match &self.readiness {
            ReadinessPolicy::Fixed { .. } => {}
            ReadinessPolicy::Probe {
                probe_host,
                initial_backoff_ms,
                timeout_secs,
                ..
            } => {
                if probe_host.is_empty()
                    || !probe_host
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
                {
                    return Err(invalid(format!("host de sonda inválido: '{probe_host}'")));
                }
                if *initial_backoff_ms == 0 || *timeout_secs == 0 {
                    return Err(invalid(
                        "backoff inicial e timeout da sonda devem ser positivos".to_string(),
                    ));
                }
            }
        }

        match (self.backend, &self.hypervisor) {
            (BackendKind::Proxmox, None) => {
                return Err(invalid("parâmetros do Proxmox ausentes".to_string()))
            }
            (BackendKind::Proxmox, Some(hv)) => {
                if hv.disk_gb == 0 {
                    return Err(invalid("disk_gb deve ser >= 1".to_string()));
                }
                if hv.storage.is_empty() || hv.template_storage.is_empty() {
                    return Err(invalid("storage do Proxmox não pode ser vazio".to_string()));
                }
                if hv.template_pattern.is_empty() || hv.default_template.is_empty() {
                    return Err(invalid("template do Proxmox não pode ser vazio".to_string()));
                }
            }
            (BackendKind::Lxd, _) => {}
        }

        Ok(())
    }
}

fn invalid(msg: String) -> ProvisionError {
    ProvisionError::InvalidConfig(msg)
}

/// Nomes de pacote Debian: minúsculas, dígitos e `.+-`
fn is_package_name(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+-.".contains(c))
}
