mod backend;
mod config;
mod error;
mod orchestrator;
mod steps;
mod summary;

use crate::backend::{ContainerBackend, LxdBackend, ProxmoxBackend, SystemRunner};
use crate::config::{BackendKind, FileConfig, ProvisioningSpec};
use crate::error::ProvisionError;
use crate::orchestrator::Provisioner;
use crate::steps::readiness::ThreadSleeper;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "ugc-provision",
    about = "Provisiona um container (LXD ou Proxmox) pronto para rodar o uxai-ugc-agent"
)]
struct Args {
    #[command(subcommand)]
    target: Target,

    /// Arquivo TOML com sobrescritas da configuração padrão
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Imprime o relatório final em JSON no lugar do resumo
    #[arg(long, global = true)]
    json: bool,

    /// Log em nível debug (RUST_LOG tem precedência)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Target {
    /// Container LXD local (`lxc`)
    Lxd {
        /// Nome do container (padrão: uxai-ugc)
        name: Option<String>,
    },
    /// Container no Proxmox VE (`pct`/`pveam`)
    Pve {
        /// VMID do container (padrão: 205)
        id: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_backend(spec: &ProvisioningSpec) -> anyhow::Result<Box<dyn ContainerBackend>> {
    match spec.backend {
        BackendKind::Lxd => Ok(Box::new(LxdBackend::new(SystemRunner))),
        BackendKind::Proxmox => {
            let hv = spec.hypervisor.as_ref().ok_or_else(|| {
                ProvisionError::InvalidConfig("parâmetros do Proxmox ausentes".to_string())
            })?;
            Ok(Box::new(ProxmoxBackend::new(
                SystemRunner,
                hv.template_storage.clone(),
            )))
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let (kind, container) = match args.target {
        Target::Lxd { name } => (BackendKind::Lxd, name),
        Target::Pve { id } => (BackendKind::Proxmox, id),
    };

    let file = FileConfig::discover(args.config.as_deref())?;
    let spec = ProvisioningSpec::resolve(kind, file, container)?;
    let backend = build_backend(&spec)?;

    if !args.json {
        println!(
            "🚀 Provisionando '{}' via {} ({} MiB, {} CPUs)",
            spec.container,
            backend.name(),
            spec.memory_mib,
            spec.cpus
        );
    }

    let provisioner = Provisioner::new(backend.as_ref(), &spec, &ThreadSleeper);
    let provisioner = if args.json {
        provisioner.quiet()
    } else {
        provisioner
    };
    let report = provisioner.run()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("\n{}", summary::render(&report));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_zero_flag_invocations() {
        let args = Args::try_parse_from(["ugc-provision", "pve"]).unwrap();
        assert!(matches!(args.target, Target::Pve { id: None }));
        assert!(!args.json);

        let args = Args::try_parse_from(["ugc-provision", "lxd", "ugc-lab", "--json"]).unwrap();
        match args.target {
            Target::Lxd { name } => assert_eq!(name.as_deref(), Some("ugc-lab")),
            other => panic!("subcomando inesperado: {other:?}"),
        }
        assert!(args.json);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["ugc-provision"]).is_err());
    }

    #[test]
    fn test_backend_matches_kind() {
        let spec = ProvisioningSpec::resolve(BackendKind::Proxmox, None, None).unwrap();
        assert_eq!(build_backend(&spec).unwrap().name(), "pve");

        let spec = ProvisioningSpec::resolve(BackendKind::Lxd, None, None).unwrap();
        assert_eq!(build_backend(&spec).unwrap().name(), "lxd");
    }
}
