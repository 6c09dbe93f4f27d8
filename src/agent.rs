use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::battery::{Battery, DrainTimer};
use crate::core::{
    AgentError, AgentExit, AgentId, ControlSignal, Direction, Position, State, MOVE_COST,
};
use crate::environment::Environment;
use crate::protocol::{Command, Response};
use crate::settings::AgentSettings;
use crate::transport::AgentLink;

/// Структура агента-дослідника.
pub struct Agent {
    id: AgentId,
    state: State,
    position: Position,
    battery: Battery,
    environment: Arc<dyn Environment>,
    settings: AgentSettings,
}

impl Agent {
    /// Створює нового агента в активному стані.
    pub fn new(
        id: AgentId,
        start_pos: Position,
        charge: u8,
        environment: Arc<dyn Environment>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            id,
            state: State::Active,
            position: start_pos,
            battery: Battery::new(charge),
            environment,
            settings,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn charge(&self) -> u8 {
        self.battery.charge()
    }

    fn suspended(&self) -> bool {
        self.state == State::Suspended
    }

    /// Виконує команду рядкового протоколу і повертає відповідь.
    pub fn handle_command(&mut self, cmd: &Command) -> Response {
        match cmd {
            Command::Move(direction) => self.try_move(*direction),
            Command::Treasure => {
                if self.suspended() {
                    return Response::Stopped;
                }
                let Position { row, col } = self.position;
                if self.environment.with_treasure(row, col) {
                    Response::Treasure
                } else {
                    Response::Water
                }
            }
            Command::Battery => {
                if self.suspended() && !self.settings.answer_queries_when_suspended {
                    return Response::Stopped;
                }
                Response::Charge(self.battery.charge())
            }
            Command::Position => {
                if self.suspended() && !self.settings.answer_queries_when_suspended {
                    return Response::Stopped;
                }
                Response::At(self.position)
            }
            Command::Exit => Response::Final {
                position: self.position,
                charge: self.battery.charge(),
            },
        }
    }

    fn try_move(&mut self, direction: Direction) -> Response {
        if self.suspended() {
            return Response::Stopped;
        }
        // Брак заряду відсікає запит до середовища.
        if self.battery.charge() < MOVE_COST {
            debug!(agent_id = self.id, charge = self.battery.charge(), "Недостатньо заряду для кроку");
            return Response::Ko;
        }
        let target = self.position.step(direction);
        if !self.environment.with_obstacle(target.row, target.col) {
            return Response::Ko;
        }
        self.battery.spend(MOVE_COST);
        self.position = target;
        debug!(agent_id = self.id, %target, "Крок виконано");
        Response::Ok
    }

    /// Реакція на сигнал площини керування. Для `StatusDump` повертає
    /// рядок, який треба записати в канал відповідей.
    pub fn apply_signal(&mut self, signal: ControlSignal) -> Option<Response> {
        match signal {
            ControlSignal::Suspend => {
                self.state = State::Suspended;
                info!(agent_id = self.id, "Призупинено");
                None
            }
            ControlSignal::Resume => {
                self.state = State::Active;
                info!(agent_id = self.id, "Відновлено");
                None
            }
            ControlSignal::Recharge => {
                self.battery.recharge();
                info!(agent_id = self.id, "Батарею заряджено");
                None
            }
            ControlSignal::StatusDump => Some(Response::Status {
                id: self.id,
                position: self.position,
                charge: self.battery.charge(),
            }),
        }
    }

    /// Один тик фонового розряду. Призупинений агент не розряджається.
    pub fn tick(&mut self) {
        if !self.suspended() {
            self.battery.drain(1);
        }
    }

    fn sync_timer(&self, timer: &mut DrainTimer) {
        let now = Instant::now();
        match self.state {
            State::Active => timer.resume(now),
            State::Suspended => timer.pause(now),
        }
    }

    /// Асинхронний життєвий цикл агента.
    pub async fn run(
        mut self,
        mut link: AgentLink,
        mut control: mpsc::Receiver<ControlSignal>,
    ) -> Result<AgentExit, AgentError> {
        info!(
            agent_id = self.id,
            position = %self.position,
            "Агент ініціалізовано та готовий до роботи"
        );

        let mut timer = DrainTimer::started(self.settings.drain_period(), Instant::now());
        let mut control_open = true;

        loop {
            let deadline = timer.deadline();
            tokio::select! {
                biased;

                signal = control.recv(), if control_open => match signal {
                    Some(signal) => {
                        if let Some(report) = self.apply_signal(signal) {
                            link.send(&report).await.map_err(|source| AgentError::Io { id: self.id, source })?;
                        }
                        self.sync_timer(&mut timer);
                    }
                    None => {
                        debug!(agent_id = self.id, "Канал керування закрито");
                        control_open = false;
                    }
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    timer.fire();
                    self.tick();
                }

                line = link.next_line() => {
                    let line = line.map_err(|source| AgentError::Io { id: self.id, source })?;
                    let Some(line) = line else {
                        warn!(agent_id = self.id, "Втрачено зв'язок з контролером");
                        return Err(AgentError::TransportClosed(self.id));
                    };

                    let (response, exit) = match Command::parse(&line) {
                        Ok(cmd) => (self.handle_command(&cmd), cmd == Command::Exit),
                        Err(e) => {
                            warn!(agent_id = self.id, %line, "Некоректна команда: {}", e);
                            (Response::Invalid(e.to_string()), false)
                        }
                    };
                    link.send(&response).await.map_err(|source| AgentError::Io { id: self.id, source })?;

                    if exit {
                        info!(agent_id = self.id, position = %self.position, charge = self.battery.charge(), "Агент завершує роботу");
                        return Ok(AgentExit::success());
                    }
                }
            }
        }
    }
}
