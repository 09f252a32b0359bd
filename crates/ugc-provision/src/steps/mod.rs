//! Etapas do provisionamento, na ordem em que o orquestrador as executa:
//!
//! 1. [`lifecycle`]: cria ou reaproveita o container (e resolve o
//!    [`template`] quando o backend exige)
//! 2. [`limits`]: memória e CPU
//! 3. [`readiness`]: espera pela rede
//! 4. [`packages`]: dependências do sistema via apt
//! 5. [`deploy`]: código da aplicação
//! 6. [`runtime_env`]: venv Python e requirements

pub mod deploy;
pub mod lifecycle;
pub mod limits;
pub mod packages;
pub mod readiness;
pub mod runtime_env;
pub mod template;

/// Aspas simples para bash. Strings só com caracteres seguros passam intactas.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
