//! Local process lifecycle management: start/stop/restart/status for the
//! three GLADyS services, spawned as detached `cargo run` processes and
//! tracked by PID file under the configured run directory.

use std::fs;
use std::net::TcpStream;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::config::{find_service, CliConfig, ServiceDef};

fn is_port_open(port: u16) -> bool {
    TcpStream::connect_timeout(&format!("127.0.0.1:{port}").parse().unwrap(), Duration::from_millis(200)).is_ok()
}

fn read_pid(config: &CliConfig, name: &str) -> Option<u32> {
    fs::read_to_string(config.pidfile(name)).ok()?.trim().parse().ok()
}

fn process_alive(pid: u32) -> bool {
    Command::new("kill").arg("-0").arg(pid.to_string()).status().map(|s| s.success()).unwrap_or(false)
}

pub struct ServiceStatus {
    pub name: String,
    pub description: String,
    pub port: u16,
    pub pid: Option<u32>,
    pub running: bool,
}

pub fn status(config: &CliConfig, svc: &ServiceDef) -> ServiceStatus {
    let pid = read_pid(config, svc.name).filter(|p| process_alive(*p));
    let running = is_port_open(svc.port);
    ServiceStatus { name: svc.name.to_string(), description: svc.description.to_string(), port: svc.port, pid, running }
}

pub fn start(config: &CliConfig, svc: &ServiceDef, wait: bool) -> Result<bool> {
    if is_port_open(svc.port) {
        println!("  {}: already running on port {}", svc.name, svc.port);
        return Ok(true);
    }

    fs::create_dir_all(&config.run_dir).context("creating run directory")?;
    println!("  starting {} ({})...", svc.name, svc.description);

    let log = fs::File::create(config.logfile(svc.name))?;
    let log_err = log.try_clone()?;
    let child = Command::new(svc.cmd[0])
        .args(&svc.cmd[1..])
        .current_dir(svc.cwd)
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .spawn()
        .with_context(|| format!("spawning {}", svc.name))?;

    fs::write(config.pidfile(svc.name), child.id().to_string())?;

    if !wait {
        println!("  {}: started (pid {})", svc.name, child.id());
        return Ok(true);
    }

    for _ in 0..30 {
        if is_port_open(svc.port) {
            println!("  {}: started (port {}, pid {})", svc.name, svc.port, child.id());
            return Ok(true);
        }
        std::thread::sleep(Duration::from_secs(1));
    }
    println!("  {}: started but not responding on port {}", svc.name, svc.port);
    Ok(false)
}

pub fn stop(config: &CliConfig, svc: &ServiceDef) -> Result<bool> {
    let pid = match read_pid(config, svc.name) {
        Some(pid) if process_alive(pid) => pid,
        _ => {
            println!("  {}: not running", svc.name);
            return Ok(true);
        }
    };

    println!("  stopping {} (pid {})...", svc.name, pid);
    let _ = Command::new("kill").arg("-TERM").arg(pid.to_string()).status();
    std::thread::sleep(Duration::from_millis(500));
    if process_alive(pid) {
        let _ = Command::new("kill").arg("-KILL").arg(pid.to_string()).status();
    }

    for _ in 0..10 {
        if !is_port_open(svc.port) {
            let _ = fs::remove_file(config.pidfile(svc.name));
            println!("  {}: stopped", svc.name);
            return Ok(true);
        }
        std::thread::sleep(Duration::from_millis(500));
    }
    println!("  {}: killed but port {} still in use", svc.name, svc.port);
    Ok(false)
}

pub fn restart(config: &CliConfig, svc: &ServiceDef) -> Result<bool> {
    stop(config, svc)?;
    std::thread::sleep(Duration::from_secs(1));
    start(config, svc, true)
}

pub fn resolve_targets(service: &str) -> Result<Vec<&'static ServiceDef>> {
    if service == "all" {
        return Ok(crate::config::SERVICES.iter().collect());
    }
    find_service(service).map(|s| vec![s]).ok_or_else(|| anyhow!("unknown service: {service}"))
}
