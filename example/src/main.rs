use anyhow::Context;
use clap::Parser;
use led_serial::led_serial::LedSerial;
use led_serial::models::action::{Action, Command};
use led_serial::models::serial_connector::SerialConnector;
use led_serial::serial::driver::{PortDriver, SystemDriver};
use led_serial::serial::scanner;
use led_serial::serial::simulated::SimulatedDriver;
use log::debug;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "led-panel", about = "Toggle a remote LED over a serial port")]
struct Args {
    /// Serial port to preselect (defaults to the first one found)
    #[arg(short, long)]
    port: Option<String>,

    /// Print the available serial ports and exit
    #[arg(short, long)]
    list: bool,

    /// Use in-memory devices SIM0 and SIM1 instead of real serial ports
    #[arg(long)]
    simulate: bool,
}

const HELP: &str = "commands: ports | select <port> | connect | disconnect | send | quit";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    let driver: Arc<dyn PortDriver> = if args.simulate {
        Arc::new(SimulatedDriver::new(["SIM0", "SIM1"]))
    } else {
        Arc::new(SystemDriver)
    };

    if args.list {
        for port in scanner::scan(driver.as_ref()) {
            println!("{}", port);
        }
        return Ok(());
    }

    let connector = args.port.map(SerialConnector::Manual).unwrap_or_default();

    // initialize Tokio runtime
    let rt = Runtime::new().context("failed to start the tokio runtime")?;
    rt.block_on(run(driver, connector))
}

async fn run(driver: Arc<dyn PortDriver>, connector: SerialConnector) -> anyhow::Result<()> {
    let (tx, _) = broadcast::channel(256);
    let mut ready = tx.subscribe();
    let mut rx = tx.subscribe();

    let t = tx.clone();
    let controller = tokio::spawn(async move {
        let mut panel = LedSerial::new(t, driver);
        panel.start(connector).await;
    });

    // print what the lib reports
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(Action::PanelChanged(view)) => println!("{}", view),
                Ok(Action::PortsScanned(ports)) => println!("ports: {}", ports.join(", ")),
                Ok(a) => debug!("{:?}", a),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    // the controller listens once it published its first panel
    while let Ok(action) = ready.recv().await {
        if let Action::PanelChanged(_) = action {
            break;
        }
    }
    drop(ready);

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut quit = false;
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                println!("{}", msg);
                continue;
            }
        };
        quit = command == Command::Shutdown;
        tx.send(Action::Command(command))?;
        if quit {
            break;
        }
    }
    // end of input closes the port too
    if !quit {
        tx.send(Action::Command(Command::Shutdown))?;
    }

    controller.await?;
    drop(tx);
    printer.await?;
    Ok(())
}

fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };
    let command = match word {
        "ports" | "scan" => Command::Scan,
        "select" => Command::SelectPort(words.next().ok_or("usage: select <port>")?.to_string()),
        "connect" => Command::Connect,
        "disconnect" => Command::Disconnect,
        "send" | "toggle" => Command::ToggleLed,
        "quit" | "exit" => Command::Shutdown,
        "help" => return Err(HELP.to_string()),
        other => return Err(format!("unknown command '{}'; {}", other, HELP)),
    };
    Ok(Some(command))
}
