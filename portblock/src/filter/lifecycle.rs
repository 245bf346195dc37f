//! Brings the filter up, keeps it running and tears it down.
//!
//! ```text
//! Unloaded -> Loaded -> Configured -> Attached -> Running -> Detaching -> Terminated
//! ```
//!
//! [`Lifecycle`] records every resource it acquires. Teardown releases them in
//! reverse order: detach, release the cell, release the program. Each step is
//! attempted even when an earlier one fails. When setup fails part way, or the
//! orchestrator is dropped without an explicit shutdown, `Drop` releases what
//! is still held, so every resource is released exactly once.

use std::{
    fmt,
    io::{self, Write},
    path::PathBuf,
};

use aya::{
    Ebpf,
    programs::{Xdp, xdp::XdpLinkId},
};
use portblock_common::PROGRAM_NAME;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::{
    error::{PortblockError, Result},
    filter::{
        attach::{self, XdpMode},
        cell::{BlockedPortCell, PortCell},
    },
    runtime::{context::Context, signals::Trigger},
};

/// Kernel-facing operations the orchestrator sequences.
pub trait Datapath {
    type Cell: PortCell;
    type Link;

    /// Reads, parses and verifies the program object.
    fn load(&mut self) -> Result<()>;

    /// Hands out the shared blocked-port cell of the loaded object.
    fn take_cell(&mut self) -> Result<Self::Cell>;

    fn attach(&mut self, interface: &str, mode: XdpMode) -> Result<Self::Link>;

    fn detach(&mut self, link: Self::Link) -> Result<()>;

    fn release_cell(&mut self, cell: Self::Cell) -> Result<()>;

    fn release_program(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unloaded,
    Loaded,
    Configured,
    Attached,
    Running,
    Detaching,
    Terminated,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Unloaded => "unloaded",
            State::Loaded => "loaded",
            State::Configured => "configured",
            State::Attached => "attached",
            State::Running => "running",
            State::Detaching => "detaching",
            State::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

pub struct Lifecycle<D: Datapath> {
    datapath: D,
    state: State,
    loaded: bool,
    cell: Option<D::Cell>,
    link: Option<D::Link>,
    interface: Option<String>,
}

impl<D: Datapath> Lifecycle<D> {
    pub fn new(datapath: D) -> Self {
        Self {
            datapath,
            state: State::Unloaded,
            loaded: false,
            cell: None,
            link: None,
            interface: None,
        }
    }

    pub fn load(&mut self) -> Result<()> {
        self.expect_state(State::Unloaded)?;
        self.datapath.load()?;
        self.loaded = true;
        self.transition(State::Loaded);
        Ok(())
    }

    /// Takes the cell and writes the initial blocked port.
    pub fn configure(&mut self, port: u16) -> Result<()> {
        self.expect_state(State::Loaded)?;
        let cell = self.cell.insert(self.datapath.take_cell()?);
        cell.set(port)?;
        self.transition(State::Configured);
        info!(
            event.name = "lifecycle.port_configured",
            blocked_port = port,
            "blocked port configured"
        );
        Ok(())
    }

    pub fn attach(&mut self, interface: &str, mode: XdpMode) -> Result<()> {
        self.expect_state(State::Configured)?;
        self.link = Some(self.datapath.attach(interface, mode)?);
        self.interface = Some(interface.to_string());
        self.transition(State::Attached);
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.expect_state(State::Attached)?;
        self.transition(State::Running);
        Ok(())
    }

    /// Current content of the cell, `None` before `configure`.
    pub fn blocked_port(&self) -> Result<Option<u16>> {
        match &self.cell {
            Some(cell) => cell.get(),
            None => Ok(None),
        }
    }

    /// Overwrites the blocked port in the live cell.
    pub fn set_port(&mut self, port: u16) -> Result<()> {
        let cell = self
            .cell
            .as_mut()
            .ok_or_else(|| PortblockError::config("blocked port cell is not held"))?;
        cell.set(port)
    }

    /// Detaches, releases the cell and releases the program, in that order.
    /// Failures are logged and counted; every step still runs.
    pub fn shutdown(&mut self) -> usize {
        if self.state == State::Terminated {
            return 0;
        }
        self.transition(State::Detaching);

        let mut failed = 0;

        if let Some(link) = self.link.take() {
            let iface = self.interface.take().unwrap_or_default();
            match self.datapath.detach(link) {
                Ok(()) => info!(
                    event.name = "lifecycle.program_detached",
                    network.interface.name = %iface,
                    "xdp program detached"
                ),
                Err(e) => {
                    failed += 1;
                    warn!(
                        event.name = "lifecycle.detach_failed",
                        network.interface.name = %iface,
                        error.message = %e,
                        "failed to detach xdp program"
                    );
                }
            }
        }

        if let Some(cell) = self.cell.take()
            && let Err(e) = self.datapath.release_cell(cell)
        {
            failed += 1;
            warn!(
                event.name = "lifecycle.cell_release_failed",
                error.message = %e,
                "failed to release blocked port cell"
            );
        }

        if self.loaded {
            self.loaded = false;
            if let Err(e) = self.datapath.release_program() {
                failed += 1;
                warn!(
                    event.name = "lifecycle.program_release_failed",
                    error.message = %e,
                    "failed to release xdp program"
                );
            }
        }

        self.transition(State::Terminated);
        info!(
            event.name = "lifecycle.shutdown_completed",
            failed_count = failed,
            "filter shutdown completed"
        );
        failed
    }

    fn expect_state(&self, expected: State) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PortblockError::internal(format!(
                "lifecycle is {}, expected {expected}",
                self.state
            )))
        }
    }

    fn transition(&mut self, next: State) {
        info!(
            event.name = "lifecycle.transition",
            lifecycle.from = %self.state,
            lifecycle.to = %next,
            "lifecycle state changed"
        );
        self.state = next;
    }
}

impl<D: Datapath> Drop for Lifecycle<D> {
    fn drop(&mut self) {
        if self.state != State::Terminated {
            self.shutdown();
        }
    }
}

/// Runs the filter until a shutdown trigger arrives.
///
/// Setup errors end the run after releasing whatever was acquired. While
/// running, reload triggers re-read the configuration file and apply a changed
/// blocked port to the live cell.
pub async fn run<D: Datapath>(
    datapath: D,
    context: Context,
    triggers: mpsc::Receiver<Trigger>,
) -> Result<()> {
    run_with_output(datapath, context, triggers, &mut io::stdout()).await
}

/// [`run`] with the operator-facing lines written to `out`.
async fn run_with_output<D: Datapath, W: Write>(
    datapath: D,
    mut context: Context,
    mut triggers: mpsc::Receiver<Trigger>,
    out: &mut W,
) -> Result<()> {
    let mut lifecycle = Lifecycle::new(datapath);
    let conf = &context.conf;

    lifecycle.load()?;
    lifecycle.configure(conf.port)?;
    lifecycle.attach(&conf.interface, conf.xdp_mode)?;
    lifecycle.start()?;

    announce(out, format_args!("Blocking TCP packets on port {}", conf.port));

    loop {
        match triggers.recv().await {
            Some(Trigger::Reload) => reload(&mut lifecycle, &mut context),
            Some(Trigger::Shutdown) | None => break,
        }
    }

    announce(out, format_args!("Exiting..."));
    lifecycle.shutdown();

    Ok(())
}

fn announce<W: Write>(out: &mut W, line: fmt::Arguments<'_>) {
    if let Err(e) = writeln!(out, "{line}") {
        warn!(
            event.name = "lifecycle.output_failed",
            error.message = %e,
            "failed to write status line"
        );
    }
}

/// Applies the blocked port of a freshly resolved configuration. Interface,
/// mode and program path stay as they were.
fn reload<D: Datapath>(lifecycle: &mut Lifecycle<D>, context: &mut Context) {
    let reloaded = match context.reload() {
        Ok(reloaded) => reloaded,
        Err(e) => {
            warn!(
                event.name = "lifecycle.reload_failed",
                error.message = %e,
                blocked_port = context.conf.port,
                "failed to reload configuration, keeping current blocked port"
            );
            return;
        }
    };
    let conf = &mut context.conf;

    if reloaded.interface != conf.interface
        || reloaded.xdp_mode != conf.xdp_mode
        || reloaded.program_path != conf.program_path
    {
        warn!(
            event.name = "lifecycle.reload_ignored_fields",
            "interface, xdp_mode and program_path changes take effect on restart"
        );
    }

    match lifecycle.blocked_port() {
        Ok(Some(current)) if current == reloaded.port => {
            info!(
                event.name = "lifecycle.reload_unchanged",
                blocked_port = current,
                "blocked port unchanged"
            );
            return;
        }
        Ok(_) => {}
        Err(e) => warn!(
            event.name = "lifecycle.cell_read_failed",
            error.message = %e,
            "failed to read blocked port, writing reloaded value"
        ),
    }

    match lifecycle.set_port(reloaded.port) {
        Ok(()) => {
            info!(
                event.name = "lifecycle.port_reconfigured",
                blocked_port.previous = conf.port,
                blocked_port = reloaded.port,
                "blocked port reconfigured"
            );
            conf.port = reloaded.port;
        }
        Err(e) => error!(
            event.name = "lifecycle.port_reconfigure_failed",
            error.message = %e,
            blocked_port = conf.port,
            "failed to write reloaded blocked port, keeping current blocked port"
        ),
    }
}

/// [`Datapath`] backed by an aya-loaded eBPF object.
pub struct AyaDatapath {
    program_path: PathBuf,
    ebpf: Option<Ebpf>,
}

impl AyaDatapath {
    pub fn new(program_path: PathBuf) -> Self {
        Self {
            program_path,
            ebpf: None,
        }
    }

    fn program(&mut self) -> std::result::Result<&mut Xdp, String> {
        let ebpf = self
            .ebpf
            .as_mut()
            .ok_or_else(|| "program is not loaded".to_string())?;
        ebpf.program_mut(PROGRAM_NAME)
            .ok_or_else(|| format!("program '{PROGRAM_NAME}' not found in object"))?
            .try_into()
            .map_err(|e| format!("program '{PROGRAM_NAME}' is not an XDP program: {e}"))
    }
}

impl Datapath for AyaDatapath {
    type Cell = BlockedPortCell;
    type Link = XdpLinkId;

    fn load(&mut self) -> Result<()> {
        let mut ebpf = Ebpf::load_file(&self.program_path).map_err(|e| {
            PortblockError::load(format!("{}: {e}", self.program_path.display()))
        })?;

        let program: &mut Xdp = ebpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| {
                PortblockError::load(format!("program '{PROGRAM_NAME}' not found in object"))
            })?
            .try_into()
            .map_err(|e| {
                PortblockError::load(format!("program '{PROGRAM_NAME}' is not an XDP program: {e}"))
            })?;
        program.load().map_err(PortblockError::load)?;

        info!(
            event.name = "lifecycle.program_loaded",
            ebpf.program.name = PROGRAM_NAME,
            ebpf.object.path = %self.program_path.display(),
            "xdp program loaded"
        );
        self.ebpf = Some(ebpf);
        Ok(())
    }

    fn take_cell(&mut self) -> Result<Self::Cell> {
        let ebpf = self
            .ebpf
            .as_mut()
            .ok_or_else(|| PortblockError::config("program is not loaded"))?;
        BlockedPortCell::take(ebpf)
    }

    fn attach(&mut self, interface: &str, mode: XdpMode) -> Result<Self::Link> {
        let iface = attach::resolve_interface(interface)?;
        let program = self
            .program()
            .map_err(|e| PortblockError::attach(iface.as_str(), e))?;
        attach::attach(program, &iface, mode)
    }

    fn detach(&mut self, link: Self::Link) -> Result<()> {
        self.program()
            .map_err(PortblockError::detach)?
            .detach(link)
            .map_err(PortblockError::detach)
    }

    fn release_cell(&mut self, cell: Self::Cell) -> Result<()> {
        drop(cell);
        Ok(())
    }

    fn release_program(&mut self) -> Result<()> {
        let result = self
            .program()
            .map_err(PortblockError::internal)
            .and_then(|program| program.unload().map_err(PortblockError::internal));
        self.ebpf = None;
        result
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::PathBuf,
        sync::{Arc, Mutex},
    };

    use clap::Parser;
    use figment::Jail;

    use super::*;
    use crate::runtime::{cli::Cli, conf::Conf};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Load,
        TakeCell,
        Set(u16),
        Attach(String, XdpMode),
        Detach,
        ReleaseCell,
        ReleaseProgram,
    }

    type Log = Arc<Mutex<Vec<Call>>>;

    #[derive(Default, Clone, Copy)]
    struct Failures {
        load: bool,
        set: bool,
        attach: bool,
        detach: bool,
        release_cell: bool,
    }

    struct FakeCell {
        log: Log,
        value: Option<u16>,
        fail_set: bool,
    }

    impl PortCell for FakeCell {
        fn set(&mut self, port: u16) -> Result<()> {
            self.log.lock().unwrap().push(Call::Set(port));
            if self.fail_set {
                return Err(PortblockError::config("write rejected"));
            }
            self.value = Some(port);
            Ok(())
        }

        fn get(&self) -> Result<Option<u16>> {
            Ok(self.value)
        }
    }

    struct FakeDatapath {
        log: Log,
        fail: Failures,
    }

    impl FakeDatapath {
        fn new(fail: Failures) -> (Self, Log) {
            let log = Log::default();
            (
                Self {
                    log: log.clone(),
                    fail,
                },
                log,
            )
        }

        fn record(&self, call: Call) {
            self.log.lock().unwrap().push(call);
        }
    }

    impl Datapath for FakeDatapath {
        type Cell = FakeCell;
        type Link = u32;

        fn load(&mut self) -> Result<()> {
            self.record(Call::Load);
            if self.fail.load {
                return Err(PortblockError::load("verifier rejected program"));
            }
            Ok(())
        }

        fn take_cell(&mut self) -> Result<FakeCell> {
            self.record(Call::TakeCell);
            Ok(FakeCell {
                log: self.log.clone(),
                value: None,
                fail_set: self.fail.set,
            })
        }

        fn attach(&mut self, interface: &str, mode: XdpMode) -> Result<u32> {
            self.record(Call::Attach(interface.to_string(), mode));
            if self.fail.attach {
                return Err(PortblockError::attach(interface, "no such interface"));
            }
            Ok(7)
        }

        fn detach(&mut self, link: u32) -> Result<()> {
            assert_eq!(link, 7);
            self.record(Call::Detach);
            if self.fail.detach {
                return Err(PortblockError::detach("link already gone"));
            }
            Ok(())
        }

        fn release_cell(&mut self, _cell: FakeCell) -> Result<()> {
            self.record(Call::ReleaseCell);
            if self.fail.release_cell {
                return Err(PortblockError::internal("map close failed"));
            }
            Ok(())
        }

        fn release_program(&mut self) -> Result<()> {
            self.record(Call::ReleaseProgram);
            Ok(())
        }
    }

    fn calls(log: &Log) -> Vec<Call> {
        log.lock().unwrap().clone()
    }

    fn attach_eth0() -> Call {
        Call::Attach("eth0".to_string(), XdpMode::Skb)
    }

    fn default_conf() -> Conf {
        Conf {
            program_path: PathBuf::from("/nonexistent/portblock-ebpf"),
            ..Conf::default()
        }
    }

    /// Context as if started with no flags and no environment.
    fn bare_context(conf: Conf) -> Context {
        let cli = Cli {
            config: None,
            port: None,
            interface: None,
            xdp_mode: None,
            program_path: None,
            log_level: None,
        };
        Context { cli, conf }
    }

    #[test]
    fn test_full_sequence_releases_in_reverse_order() {
        let (datapath, log) = FakeDatapath::new(Failures::default());
        let mut lifecycle = Lifecycle::new(datapath);

        lifecycle.load().unwrap();
        assert_eq!(lifecycle.state, State::Loaded);
        lifecycle.configure(4040).unwrap();
        assert_eq!(lifecycle.state, State::Configured);
        assert_eq!(lifecycle.blocked_port().unwrap(), Some(4040));
        lifecycle.attach("eth0", XdpMode::Skb).unwrap();
        assert_eq!(lifecycle.state, State::Attached);
        lifecycle.start().unwrap();
        assert_eq!(lifecycle.state, State::Running);

        assert_eq!(lifecycle.shutdown(), 0);
        assert_eq!(lifecycle.state, State::Terminated);
        drop(lifecycle);

        assert_eq!(
            calls(&log),
            vec![
                Call::Load,
                Call::TakeCell,
                Call::Set(4040),
                attach_eth0(),
                Call::Detach,
                Call::ReleaseCell,
                Call::ReleaseProgram,
            ]
        );
    }

    #[test]
    fn test_shutdown_twice_releases_once() {
        let (datapath, log) = FakeDatapath::new(Failures::default());
        let mut lifecycle = Lifecycle::new(datapath);
        lifecycle.load().unwrap();
        lifecycle.configure(4040).unwrap();
        lifecycle.attach("eth0", XdpMode::Skb).unwrap();

        lifecycle.shutdown();
        lifecycle.shutdown();
        drop(lifecycle);

        let calls = calls(&log);
        assert_eq!(calls.iter().filter(|c| **c == Call::Detach).count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == Call::ReleaseCell).count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == Call::ReleaseProgram).count(), 1);
    }

    #[test]
    fn test_load_failure_releases_nothing() {
        let (datapath, log) = FakeDatapath::new(Failures {
            load: true,
            ..Default::default()
        });
        let mut lifecycle = Lifecycle::new(datapath);

        let err = lifecycle.load().unwrap_err();
        assert!(matches!(err, PortblockError::Load(_)));
        drop(lifecycle);

        assert_eq!(calls(&log), vec![Call::Load]);
    }

    #[test]
    fn test_config_failure_releases_cell_then_program() {
        let (datapath, log) = FakeDatapath::new(Failures {
            set: true,
            ..Default::default()
        });
        let mut lifecycle = Lifecycle::new(datapath);
        lifecycle.load().unwrap();

        let err = lifecycle.configure(4040).unwrap_err();
        assert!(matches!(err, PortblockError::Config(_)));
        drop(lifecycle);

        assert_eq!(
            calls(&log),
            vec![
                Call::Load,
                Call::TakeCell,
                Call::Set(4040),
                Call::ReleaseCell,
                Call::ReleaseProgram,
            ]
        );
    }

    #[test]
    fn test_attach_failure_releases_cell_and_program_once() {
        let (datapath, log) = FakeDatapath::new(Failures {
            attach: true,
            ..Default::default()
        });
        let mut lifecycle = Lifecycle::new(datapath);
        lifecycle.load().unwrap();
        lifecycle.configure(4040).unwrap();

        let err = lifecycle.attach("eth0", XdpMode::Skb).unwrap_err();
        assert!(matches!(err, PortblockError::Attach { .. }));
        drop(lifecycle);

        assert_eq!(
            calls(&log),
            vec![
                Call::Load,
                Call::TakeCell,
                Call::Set(4040),
                attach_eth0(),
                Call::ReleaseCell,
                Call::ReleaseProgram,
            ]
        );
    }

    #[test]
    fn test_teardown_continues_past_failures() {
        let (datapath, log) = FakeDatapath::new(Failures {
            detach: true,
            release_cell: true,
            ..Default::default()
        });
        let mut lifecycle = Lifecycle::new(datapath);
        lifecycle.load().unwrap();
        lifecycle.configure(4040).unwrap();
        lifecycle.attach("eth0", XdpMode::Skb).unwrap();
        lifecycle.start().unwrap();

        assert_eq!(lifecycle.shutdown(), 2);
        assert_eq!(lifecycle.state, State::Terminated);

        assert_eq!(
            &calls(&log)[4..],
            &[Call::Detach, Call::ReleaseCell, Call::ReleaseProgram]
        );
    }

    #[test]
    fn test_out_of_order_calls_are_rejected() {
        let (datapath, log) = FakeDatapath::new(Failures::default());
        let mut lifecycle = Lifecycle::new(datapath);

        assert!(lifecycle.configure(4040).is_err());
        assert!(lifecycle.attach("eth0", XdpMode::Skb).is_err());
        assert!(lifecycle.set_port(8080).is_err());
        assert_eq!(lifecycle.blocked_port().unwrap(), None);
        drop(lifecycle);

        assert!(calls(&log).is_empty());
    }

    #[test]
    fn test_set_port_is_idempotent() {
        let (datapath, log) = FakeDatapath::new(Failures::default());
        let mut lifecycle = Lifecycle::new(datapath);
        lifecycle.load().unwrap();
        lifecycle.configure(4040).unwrap();

        lifecycle.set_port(8080).unwrap();
        lifecycle.set_port(8080).unwrap();
        assert_eq!(lifecycle.blocked_port().unwrap(), Some(8080));
        drop(lifecycle);

        assert_eq!(
            calls(&log),
            vec![
                Call::Load,
                Call::TakeCell,
                Call::Set(4040),
                Call::Set(8080),
                Call::Set(8080),
                Call::ReleaseCell,
                Call::ReleaseProgram,
            ]
        );
    }

    #[test]
    fn test_reload_applies_changed_port() {
        Jail::expect_with(|jail| {
            let path = "portblock.yaml";
            jail.create_file(path, "port: 4040")?;
            let cli = Cli::parse_from(["portblock", "--config", path]);
            let mut context = Context::from_cli(cli).expect("config loads");

            let (datapath, log) = FakeDatapath::new(Failures::default());
            let mut lifecycle = Lifecycle::new(datapath);
            lifecycle.load().unwrap();
            lifecycle.configure(context.conf.port).unwrap();

            jail.create_file(path, "port: 8080")?;
            reload(&mut lifecycle, &mut context);
            assert_eq!(context.conf.port, 8080);
            assert_eq!(lifecycle.blocked_port().unwrap(), Some(8080));

            // unchanged file, no write
            reload(&mut lifecycle, &mut context);
            drop(lifecycle);

            let sets: Vec<Call> = calls(&log)
                .into_iter()
                .filter(|c| matches!(c, Call::Set(_)))
                .collect();
            assert_eq!(sets, vec![Call::Set(4040), Call::Set(8080)]);

            Ok(())
        });
    }

    #[test]
    fn test_failed_reload_keeps_port() {
        Jail::expect_with(|jail| {
            let path = "portblock.yaml";
            jail.create_file(path, "port: 4040")?;
            let cli = Cli::parse_from(["portblock", "--config", path]);
            let mut context = Context::from_cli(cli).expect("config loads");

            let (datapath, _log) = FakeDatapath::new(Failures::default());
            let mut lifecycle = Lifecycle::new(datapath);
            lifecycle.load().unwrap();
            lifecycle.configure(context.conf.port).unwrap();

            jail.create_file(path, "port: 99999")?;
            reload(&mut lifecycle, &mut context);
            assert_eq!(context.conf.port, 4040);
            assert_eq!(lifecycle.blocked_port().unwrap(), Some(4040));

            Ok(())
        });
    }

    #[test]
    fn test_reload_without_config_file_keeps_port() {
        let mut context = bare_context(default_conf());
        let (datapath, _log) = FakeDatapath::new(Failures::default());
        let mut lifecycle = Lifecycle::new(datapath);
        lifecycle.load().unwrap();
        lifecycle.configure(context.conf.port).unwrap();

        reload(&mut lifecycle, &mut context);
        assert_eq!(context.conf.port, 4040);
        assert_eq!(lifecycle.blocked_port().unwrap(), Some(4040));
    }

    #[test]
    fn test_reload_keeps_port_given_on_command_line() {
        Jail::expect_with(|jail| {
            let path = "portblock.yaml";
            jail.create_file(path, "port: 4040")?;
            let cli = Cli::parse_from(["portblock", "--config", path, "--port", "22"]);
            let mut context = Context::from_cli(cli).expect("config loads");

            let (datapath, log) = FakeDatapath::new(Failures::default());
            let mut lifecycle = Lifecycle::new(datapath);
            lifecycle.load().unwrap();
            lifecycle.configure(context.conf.port).unwrap();

            reload(&mut lifecycle, &mut context);
            assert_eq!(lifecycle.blocked_port().unwrap(), Some(22));

            jail.create_file(path, "port: 8080")?;
            reload(&mut lifecycle, &mut context);
            assert_eq!(lifecycle.blocked_port().unwrap(), Some(22));
            assert_eq!(context.conf.port, 22);
            drop(lifecycle);

            let sets: Vec<Call> = calls(&log)
                .into_iter()
                .filter(|c| matches!(c, Call::Set(_)))
                .collect();
            assert_eq!(sets, vec![Call::Set(22)]);

            Ok(())
        });
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let (datapath, log) = FakeDatapath::new(Failures::default());
        let (tx, rx) = mpsc::channel(4);
        tx.send(Trigger::Shutdown).await.unwrap();

        run(datapath, bare_context(default_conf()), rx).await.unwrap();

        assert_eq!(
            calls(&log),
            vec![
                Call::Load,
                Call::TakeCell,
                Call::Set(4040),
                attach_eth0(),
                Call::Detach,
                Call::ReleaseCell,
                Call::ReleaseProgram,
            ]
        );
    }

    #[test]
    fn test_reload_writes_no_status_line() {
        Jail::expect_with(|jail| {
            let path = "portblock.yaml";
            jail.create_file(path, "port: 4040")?;
            let cli = Cli::parse_from(["portblock", "--config", path]);
            let context = Context::from_cli(cli).expect("config loads");
            jail.create_file(path, "port: 8080")?;

            let (datapath, log) = FakeDatapath::new(Failures::default());
            let (tx, rx) = mpsc::channel(4);
            tx.try_send(Trigger::Reload).unwrap();
            tx.try_send(Trigger::Shutdown).unwrap();

            let mut out = Vec::new();
            tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap()
                .block_on(run_with_output(datapath, context, rx, &mut out))
                .unwrap();

            assert!(calls(&log).contains(&Call::Set(8080)));
            assert_eq!(
                String::from_utf8(out).unwrap(),
                "Blocking TCP packets on port 4040\nExiting...\n"
            );

            Ok(())
        });
    }

    #[tokio::test]
    async fn test_run_stops_when_signal_source_closes() {
        let (datapath, log) = FakeDatapath::new(Failures::default());
        let (tx, rx) = mpsc::channel(4);
        drop(tx);

        run(datapath, bare_context(default_conf()), rx).await.unwrap();

        assert_eq!(calls(&log).last(), Some(&Call::ReleaseProgram));
    }

    #[tokio::test]
    async fn test_run_attach_failure_is_fatal_and_cleans_up() {
        let (datapath, log) = FakeDatapath::new(Failures {
            attach: true,
            ..Default::default()
        });
        let (_tx, rx) = mpsc::channel(4);

        let err = run(datapath, bare_context(default_conf()), rx).await.unwrap_err();
        assert!(matches!(err, PortblockError::Attach { .. }));

        assert_eq!(
            calls(&log),
            vec![
                Call::Load,
                Call::TakeCell,
                Call::Set(4040),
                attach_eth0(),
                Call::ReleaseCell,
                Call::ReleaseProgram,
            ]
        );
    }

    #[tokio::test]
    async fn test_run_uses_configured_port_interface_and_mode() {
        let (datapath, log) = FakeDatapath::new(Failures::default());
        let (tx, rx) = mpsc::channel(4);
        tx.send(Trigger::Shutdown).await.unwrap();

        let conf = Conf {
            port: 22,
            interface: "ens3".to_string(),
            xdp_mode: XdpMode::Auto,
            ..default_conf()
        };
        run(datapath, bare_context(conf), rx).await.unwrap();

        let calls = calls(&log);
        assert!(calls.contains(&Call::Set(22)));
        assert!(calls.contains(&Call::Attach("ens3".to_string(), XdpMode::Auto)));
    }

    #[test]
    fn test_aya_datapath_load_missing_object() {
        let mut datapath = AyaDatapath::new(PathBuf::from("/nonexistent/portblock-ebpf"));
        let err = datapath.load().unwrap_err();
        assert!(matches!(err, PortblockError::Load(_)));
        assert!(err.to_string().contains("/nonexistent/portblock-ebpf"));
        assert!(datapath.take_cell().is_err());
    }
}
