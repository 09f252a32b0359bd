//! Resumo final para o operador: como entrar, o que configurar e como subir

use crate::orchestrator::ProvisionReport;
use crate::steps::deploy::DeployOutcome;
use crate::steps::runtime_env::VENV_DIR;
use std::fmt::Write;

/// Chaves que a aplicação lê do `.env`
pub const ENV_KEYS: &[&str] = &[
    "OPENROUTER_API_KEY",
    "ELEVENLABS_API_KEY",
    "ELEVENLABS_VOICE_ID",
    "HEYGEN_API_KEY",
    "HEYGEN_AVATAR_ID",
    "OPENAI_API_KEY",
    "REDDIT_CLIENT_ID",
    "REDDIT_CLIENT_SECRET",
    "NTFY_URL",
    "UI_PASSWORD",
];

const DASHBOARD_PORT: u16 = 5000;

pub fn render(report: &ProvisionReport) -> String {
    let mut out = String::new();
    let path = &report.project_path;

    let state = if report.created { "criado" } else { "reaproveitado" };
    // escrever em String não falha
    let _ = writeln!(
        out,
        "✅ Container '{}' ({}) {state} e provisionado",
        report.container, report.backend
    );
    if let Some(template) = &report.template {
        let _ = writeln!(out, "   Template: {template}");
    }
    if let Some(address) = &report.address {
        let _ = writeln!(out, "   Endereço: {address}");
    }

    if let DeployOutcome::Skipped { reason } = &report.deploy {
        let _ = writeln!(out);
        let _ = writeln!(out, "⚠️  Código não implantado: {reason}");
        let _ = writeln!(
            out,
            "   Copie o projeto para {path} e rode `pip install -r requirements.txt` no venv."
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Próximos passos:");
    let _ = writeln!(out, "  1. Entrar no container:  {}", report.shell);
    let _ = writeln!(out, "  2. Configurar as chaves:");
    let _ = writeln!(out, "       cd {path} && cp .env.example .env");
    let _ = writeln!(out, "     Preencha no .env: {}", ENV_KEYS.join(", "));
    let _ = writeln!(out, "  3. Ativar o ambiente:    . {VENV_DIR}/bin/activate");
    let _ = writeln!(
        out,
        "  4. Dashboard:            python main.py --web --port {DASHBOARD_PORT}"
    );
    match &report.address {
        Some(address) => {
            let _ = writeln!(out, "     Acesse http://{address}:{DASHBOARD_PORT}");
        }
        None => {
            let _ = writeln!(
                out,
                "     Endereço desconhecido; consulte `hostname -I` dentro do container"
            );
        }
    }
    let _ = writeln!(
        out,
        "     Execução sem interface: python main.py --run \"<tema>\""
    );

    out
}
