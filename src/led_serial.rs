use crate::error::{LedSerialError, Result};
use crate::models::action::{Action, Command, OpenStatus, PortStatus};
use crate::models::led::LedCommand;
use crate::models::panel::{ConnectionState, PanelView};
use crate::models::serial_connector::SerialConnector;
use crate::serial::driver::PortDriver;
use crate::serial::scanner;
use crate::serial::session::SerialSession;
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::task::JoinHandle;

/// Panel controller: turns user commands into serial session calls and keeps
/// the panel in sync with the connection state.
///
/// Every session call that may block (open, write, close) runs on the
/// blocking pool, so the action loop never holds up the runtime.
pub struct LedSerial {
    tx: Sender<Action>,
    driver: Arc<dyn PortDriver>,
    session: Arc<Mutex<SerialSession>>,
    state: ConnectionState,
    view: PanelView,
    ports: Vec<String>,
    selected: Option<String>,
    // number of the latest connect, echoed back in its PortStatus
    attempt: u64,
}

impl LedSerial {
    pub fn new(tx: Sender<Action>, driver: Arc<dyn PortDriver>) -> Self {
        let session = SerialSession::new(driver.clone(), tx.clone());
        LedSerial {
            tx,
            driver,
            session: Arc::new(Mutex::new(session)),
            state: ConnectionState::Disconnected,
            view: PanelView::default(),
            ports: Vec::new(),
            selected: None,
            attempt: 0,
        }
    }

    /// scan the ports, preselect one and serve commands until shutdown
    pub async fn start(&mut self, connector: SerialConnector) {
        let rx = self.tx.subscribe();

        self.scan_ports();
        if let Some(port) = scanner::resolve(&connector, &self.ports) {
            self.set_selection(port);
        }
        self.publish();

        self.handle_action_commands(rx).await;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn view(&self) -> &PanelView {
        &self.view
    }

    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    pub fn selected_port(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn scan_ports(&mut self) -> &[String] {
        self.ports = scanner::scan(self.driver.as_ref());
        let _ = self.tx.send(Action::PortsScanned(self.ports.clone()));
        &self.ports
    }

    pub fn select_port(&mut self, port: &str) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            return Err(LedSerialError::InvalidTransition {
                from: self.state,
                event: "select a port",
            });
        }
        if !self.ports.iter().any(|p| p == port) {
            return Err(LedSerialError::UnknownPort(port.to_string()));
        }
        self.set_selection(port.to_string());
        self.publish();
        Ok(())
    }

    fn set_selection(&mut self, port: String) {
        self.view.select_port(&port);
        self.selected = Some(port);
    }

    /// Start opening the selected port on a one-shot blocking task. The
    /// outcome arrives later as `Action::Status` tagged with this attempt.
    pub fn connect(&mut self) -> Result<JoinHandle<()>> {
        let next = self.state.connect()?;
        let port = self.selected.clone().ok_or(LedSerialError::NoPortSelected)?;
        self.state = next;
        self.attempt += 1;
        self.view.show_connecting();
        self.publish();

        let attempt = self.attempt;
        let session = self.session.clone();
        let tx = self.tx.clone();
        Ok(tokio::task::spawn_blocking(move || {
            match lock(&session).open_attempt(&port, attempt) {
                Ok(()) => {}
                // a stale handle is still open, report the attempt as failed
                Err(LedSerialError::AlreadyOpen(_)) => {
                    let _ = tx.send(Action::Status(PortStatus::failed(port, attempt)));
                }
                Err(e) => debug!("{}", e),
            }
        }))
    }

    /// Apply the outcome of a connect. Only the status of the latest attempt
    /// moves the panel; an older port that turned out open is closed.
    pub async fn handle_status(&mut self, status: PortStatus) {
        let latest = status.attempt == self.attempt;
        if latest && self.state == ConnectionState::Connected {
            debug!("Port {} already connected", status.port);
            return;
        }
        if !latest || self.state != ConnectionState::Connecting {
            warn!(
                "Discarding {} status of port {} while {}",
                status.status, status.port, self.state
            );
            if status.status == OpenStatus::Opened {
                self.close_stale(status.attempt).await;
            }
            return;
        }

        let next = match status.status {
            OpenStatus::Opened => self.state.opened(),
            OpenStatus::Failed => self.state.failed(),
        };
        match next {
            Ok(state) => {
                self.state = state;
                match status.status {
                    OpenStatus::Opened => self.view.show_connected(&status.port),
                    OpenStatus::Failed => self.view.show_disconnected(),
                }
                self.publish();
            }
            Err(e) => warn!("{}", e),
        }
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.state = self.state.disconnect()?;
        self.close_session().await;
        self.view.show_disconnected();
        self.publish();
        Ok(())
    }

    /// Flip the send toggle and write the matching command.
    pub async fn toggle_led(&mut self) -> Result<LedCommand> {
        if self.state != ConnectionState::Connected {
            return Err(LedSerialError::InvalidTransition {
                from: self.state,
                event: "send",
            });
        }
        let pressed = !self.view.send_checked;
        let command = LedCommand::for_toggle(pressed);
        let ch = command.as_char();
        self.with_session(move |session| session.write(ch)).await;
        self.view.show_led(pressed);
        self.publish();
        Ok(command)
    }

    /// Close whatever is open before the application exits.
    pub async fn shutdown(&mut self) {
        self.close_session().await;
        if self.state != ConnectionState::Disconnected {
            self.state = ConnectionState::Disconnected;
            self.view.show_disconnected();
            self.publish();
        }
    }

    pub async fn handle_action_commands(&mut self, mut rx: Receiver<Action>) {
        loop {
            match rx.recv().await {
                Ok(action) => {
                    if !self.handle_action(action).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!("Action receiver lagged by {} messages", n);
                    self.resync_status().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Apply one action. Returns false once the controller was shut down.
    pub async fn handle_action(&mut self, action: Action) -> bool {
        match action {
            Action::Status(status) => self.handle_status(status).await,
            Action::Command(c) => {
                debug!("Command: {}", c);
                let result = match c {
                    Command::Scan => {
                        self.scan_ports();
                        Ok(())
                    }
                    Command::SelectPort(port) => self.select_port(&port),
                    Command::Connect => self.connect().map(|_| ()),
                    Command::Disconnect => self.disconnect().await,
                    Command::ToggleLed => self.toggle_led().await.map(|_| ()),
                    Command::Shutdown => {
                        self.shutdown().await;
                        return false;
                    }
                };
                if let Err(e) = result {
                    warn!("{}", e);
                }
            }
            Action::Closed(port) => debug!("Port {} closed.", port),
            Action::StateChange(_) | Action::PanelChanged(_) | Action::PortsScanned(_) => {}
        }
        true
    }

    // a lagged receiver may have dropped the status of the pending connect,
    // the session still has it
    async fn resync_status(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        let attempt = self.attempt;
        let status = self
            .with_session(move |session| {
                session
                    .last_status()
                    .filter(|status| status.attempt == attempt)
                    .cloned()
            })
            .await
            .flatten();
        if let Some(status) = status {
            debug!("Recovered {} status of port {}", status.status, status.port);
            self.handle_status(status).await;
        }
    }

    async fn close_session(&self) {
        self.with_session(|session| {
            session.request_close();
            session.close();
        })
        .await;
    }

    async fn close_stale(&self, attempt: u64) {
        self.with_session(move |session| {
            if session.is_connected() && session.attempt() == attempt {
                session.request_close();
                session.close();
            }
        })
        .await;
    }

    /// Run `f` on the session from the blocking pool.
    async fn with_session<F, T>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&mut SerialSession) -> T + Send + 'static,
        T: Send + 'static,
    {
        let session = self.session.clone();
        match tokio::task::spawn_blocking(move || f(&mut lock(&session))).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Serial task failed: {}", e);
                None
            }
        }
    }

    fn publish(&self) {
        let _ = self.tx.send(Action::StateChange(self.state));
        let _ = self.tx.send(Action::PanelChanged(self.view.clone()));
    }
}

fn lock(session: &Mutex<SerialSession>) -> MutexGuard<'_, SerialSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::panel::{DISABLED_LABEL, TURN_OFF_LABEL, TURN_ON_LABEL};
    use crate::serial::simulated::SimulatedDriver;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn controller(driver: &SimulatedDriver) -> (LedSerial, Receiver<Action>) {
        let (tx, rx) = broadcast::channel(64);
        let mut controller = LedSerial::new(tx, Arc::new(driver.clone()));
        controller.scan_ports();
        (controller, rx)
    }

    fn next_status(rx: &mut Receiver<Action>) -> PortStatus {
        loop {
            match rx.try_recv() {
                Ok(Action::Status(status)) => return status,
                Ok(_) => continue,
                Err(e) => panic!("no status notification: {:?}", e),
            }
        }
    }

    fn count_closed(rx: &mut Receiver<Action>, port: &str) -> usize {
        let mut closed = 0;
        while let Ok(action) = rx.try_recv() {
            if action == Action::Closed(port.to_string()) {
                closed += 1;
            }
        }
        closed
    }

    async fn connect(controller: &mut LedSerial, rx: &mut Receiver<Action>) -> PortStatus {
        controller.connect().unwrap().await.unwrap();
        let status = next_status(rx);
        controller.handle_status(status.clone()).await;
        status
    }

    #[tokio::test]
    async fn connect_success_enables_send() {
        let driver = SimulatedDriver::new(["COM5"]);
        let (mut controller, mut rx) = controller(&driver);
        controller.select_port("COM5").unwrap();

        let status = connect(&mut controller, &mut rx).await;
        assert_eq!(status, PortStatus::opened("COM5", 1));
        assert_eq!(controller.state(), ConnectionState::Connected);
        assert_eq!(controller.view().connect_label, "Disconnect from port COM5");
        assert_eq!(controller.view().send_label, TURN_ON_LABEL);
        assert!(controller.view().send_enabled);
        assert!(!controller.view().port_selector_enabled);
    }

    #[tokio::test]
    async fn connect_failure_resets_toggle() {
        let driver = SimulatedDriver::new(["COM5"]);
        driver.set_busy("COM5", true);
        let (mut controller, mut rx) = controller(&driver);
        controller.select_port("COM5").unwrap();

        let status = connect(&mut controller, &mut rx).await;
        assert_eq!(status.status.code(), 0);
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(!controller.view().connect_checked);
        assert!(!controller.view().send_enabled);
        assert_eq!(controller.view().send_label, DISABLED_LABEL);
    }

    #[tokio::test]
    async fn send_toggle_alternates_commands() {
        let driver = SimulatedDriver::new(["COM5"]);
        let (mut controller, mut rx) = controller(&driver);
        controller.select_port("COM5").unwrap();
        connect(&mut controller, &mut rx).await;

        assert_eq!(controller.toggle_led().await.unwrap(), LedCommand::On);
        assert_eq!(controller.view().send_label, TURN_OFF_LABEL);
        assert_eq!(controller.toggle_led().await.unwrap(), LedCommand::Off);
        assert_eq!(controller.view().send_label, TURN_ON_LABEL);
        assert_eq!(driver.written("COM5"), b"01".to_vec());
    }

    #[tokio::test]
    async fn disconnect_closes_port_once() {
        let driver = SimulatedDriver::new(["COM5"]);
        let (mut controller, mut rx) = controller(&driver);
        controller.select_port("COM5").unwrap();
        connect(&mut controller, &mut rx).await;

        controller.disconnect().await.unwrap();
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert_eq!(controller.view(), &PanelView::new("COM5"));
        assert_eq!(count_closed(&mut rx, "COM5"), 1);
        assert!(controller.disconnect().await.is_err());
    }

    #[tokio::test]
    async fn disconnect_waits_for_a_busy_session_without_blocking() {
        let driver = SimulatedDriver::new(["COM5"]);
        let (mut controller, mut rx) = controller(&driver);
        controller.select_port("COM5").unwrap();
        connect(&mut controller, &mut rx).await;

        // another thread holds the session, like an open still in progress
        let session = controller.session.clone();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _guard = lock(&session);
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(300));
        });
        locked_rx.recv().unwrap();

        {
            let disconnect = controller.disconnect();
            tokio::pin!(disconnect);
            tokio::select! {
                _ = &mut disconnect => panic!("disconnect finished while the session was held"),
                _ = tokio::time::sleep(Duration::from_millis(20)) => {}
            }
            disconnect.await.unwrap();
        }
        holder.join().unwrap();

        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(!lock(&controller.session).is_connected());
        assert_eq!(count_closed(&mut rx, "COM5"), 1);
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let driver = SimulatedDriver::new(["COM5"]);
        let (mut controller, _rx) = controller(&driver);
        controller.select_port("COM5").unwrap();

        let first = controller.connect().unwrap();
        assert!(matches!(
            controller.connect(),
            Err(LedSerialError::InvalidTransition { .. })
        ));
        first.await.unwrap();
        assert_eq!(driver.open_count(), 1);
    }

    #[tokio::test]
    async fn connect_requires_selection() {
        let driver = SimulatedDriver::new(Vec::<String>::new());
        let (mut controller, _rx) = controller(&driver);
        assert!(matches!(
            controller.connect(),
            Err(LedSerialError::NoPortSelected)
        ));
        assert_eq!(controller.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn selection_rules() {
        let driver = SimulatedDriver::new(["COM3", "COM5"]);
        let (mut controller, _rx) = controller(&driver);

        assert!(matches!(
            controller.select_port("COM9"),
            Err(LedSerialError::UnknownPort(_))
        ));
        controller.select_port("COM3").unwrap();
        assert_eq!(controller.selected_port(), Some("COM3"));
        assert_eq!(controller.view().connect_label, "Connect to port COM3");
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let driver = SimulatedDriver::new(["COM5"]);
        let (mut controller, _rx) = controller(&driver);
        assert!(controller.toggle_led().await.is_err());
        assert!(driver.written("COM5").is_empty());
    }

    #[tokio::test]
    async fn stale_open_is_closed() {
        let driver = SimulatedDriver::new(["COM5"]);
        let (mut controller, mut rx) = controller(&driver);
        controller.select_port("COM5").unwrap();
        lock(&controller.session).open("COM5").unwrap();

        // the user disconnected before the open finished
        controller.handle_status(next_status(&mut rx)).await;
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(!lock(&controller.session).is_connected());
    }

    #[tokio::test]
    async fn reconnect_ignores_status_of_abandoned_attempt() {
        let driver = SimulatedDriver::new(["COM5"]);
        let (mut controller, mut rx) = controller(&driver);
        controller.select_port("COM5").unwrap();

        // disconnect and connect again before the first status is handled
        controller.connect().unwrap().await.unwrap();
        controller.disconnect().await.unwrap();
        controller.connect().unwrap().await.unwrap();

        let abandoned = next_status(&mut rx);
        let latest = next_status(&mut rx);
        assert_eq!(abandoned, PortStatus::opened("COM5", 1));
        assert_eq!(latest, PortStatus::opened("COM5", 2));

        controller.handle_status(abandoned).await;
        assert_eq!(controller.state(), ConnectionState::Connecting);
        assert!(lock(&controller.session).is_connected());

        controller.handle_status(latest).await;
        assert_eq!(controller.state(), ConnectionState::Connected);
        assert_eq!(controller.toggle_led().await.unwrap(), LedCommand::On);
        assert_eq!(driver.written("COM5"), vec![b'0']);
    }

    #[tokio::test]
    async fn repeated_status_keeps_port_open() {
        let driver = SimulatedDriver::new(["COM5"]);
        let (mut controller, mut rx) = controller(&driver);
        controller.select_port("COM5").unwrap();

        let status = connect(&mut controller, &mut rx).await;
        controller.handle_status(status).await;
        assert_eq!(controller.state(), ConnectionState::Connected);
        assert!(lock(&controller.session).is_connected());
    }

    #[tokio::test]
    async fn lagged_receiver_recovers_pending_status() {
        let driver = SimulatedDriver::new(["COM5"]);
        let (tx, rx) = broadcast::channel(2);
        let mut controller = LedSerial::new(tx.clone(), Arc::new(driver.clone()));
        controller.scan_ports();
        controller.select_port("COM5").unwrap();
        controller.connect().unwrap().await.unwrap();

        // push the status out of the channel before the loop reads it
        tx.send(Action::PortsScanned(Vec::new())).unwrap();
        tx.send(Action::PortsScanned(Vec::new())).unwrap();

        let served = tokio::time::timeout(
            Duration::from_millis(500),
            controller.handle_action_commands(rx),
        )
        .await;
        assert!(served.is_err());
        assert_eq!(controller.state(), ConnectionState::Connected);
        assert!(controller.view().send_enabled);
    }

    #[tokio::test]
    async fn shutdown_closes_open_port() {
        let driver = SimulatedDriver::new(["COM5"]);
        let (mut controller, mut rx) = controller(&driver);
        controller.select_port("COM5").unwrap();
        connect(&mut controller, &mut rx).await;

        assert!(!controller.handle_action(Action::Command(Command::Shutdown)).await);
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(!lock(&controller.session).is_connected());
    }

    #[tokio::test]
    async fn start_serves_commands_until_shutdown() {
        let driver = SimulatedDriver::new(["COM5"]);
        let (tx, _) = broadcast::channel(64);
        let mut rx = tx.subscribe();
        let mut controller = LedSerial::new(tx.clone(), Arc::new(driver.clone()));

        let task = tokio::spawn(async move {
            controller.start(SerialConnector::Auto).await;
            controller
        });

        // wait for the initial panel so the controller is subscribed
        loop {
            if let Action::PanelChanged(view) = rx.recv().await.unwrap() {
                assert_eq!(view.port_label, "COM5");
                break;
            }
        }

        tx.send(Action::Command(Command::Connect)).unwrap();
        loop {
            if let Action::StateChange(ConnectionState::Connected) = rx.recv().await.unwrap() {
                break;
            }
        }
        tx.send(Action::Command(Command::ToggleLed)).unwrap();
        tx.send(Action::Command(Command::Shutdown)).unwrap();

        let controller = task.await.unwrap();
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert_eq!(driver.written("COM5"), vec![b'0']);
    }
}
