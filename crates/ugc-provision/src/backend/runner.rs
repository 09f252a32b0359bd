//! Execução de comandos no host com captura de stdout/stderr

use crate::error::ProvisionError;
use anyhow::{Context, Result};
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};

/// Comando a ser executado no host (`lxc`, `pct`, `pveam`, `tar`...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Índices de `args` que não podem aparecer em logs
    sensitive: Vec<usize>,
}

impl HostCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            sensitive: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Argumento que vai para o processo mas é mascarado na exibição
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.sensitive.push(self.args.len());
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.sensitive.contains(&i) {
                write!(f, " ***")?;
            } else if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg.replace('\'', r"'\''"))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Resultado de um comando: `(exit_status, stdout, stderr)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Converte status != 0 em erro fatal, preservando o stderr do backend
    pub fn check(self, command: &str) -> std::result::Result<Self, ProvisionError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ProvisionError::CommandFailed {
                command: command.to_string(),
                status: self.status,
                stderr: self.stderr.trim_end().to_string(),
            })
        }
    }
}

/// Ponto de costura entre os adaptadores e o sistema operacional
pub trait CommandRunner {
    /// Executa e bloqueia até o término. Não há timeout do lado do cliente.
    fn run(&self, command: &HostCommand) -> Result<ExecOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, command: &HostCommand) -> Result<ExecOutput> {
        (**self).run(command)
    }
}

/// Executor real baseado em `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &HostCommand) -> Result<ExecOutput> {
        tracing::debug!(command = %command, "executando");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Falha ao iniciar '{}'", command.program))?;

        // Threads drenam os pipes enquanto o processo roda; sem isso um
        // apt-get verboso bloqueia no buffer cheio.
        let stdout = child.stdout.take().map(|s| capture(s, Stream::Stdout));
        let stderr = child.stderr.take().map(|s| capture(s, Stream::Stderr));

        let status = child
            .wait()
            .with_context(|| format!("Falha ao aguardar '{}'", command.program))?;

        Ok(ExecOutput {
            // None = encerrado por sinal
            status: status.code().unwrap_or(-1),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn capture<R: Read + Send + 'static>(stream: R, kind: Stream) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut captured = String::new();
        for line in BufReader::new(stream).lines().map_while(|l| l.ok()) {
            match kind {
                Stream::Stdout => tracing::debug!(target: "remote", "{line}"),
                Stream::Stderr => tracing::warn!(target: "remote", "{line}"),
            }
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
