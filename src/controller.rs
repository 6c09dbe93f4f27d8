//! Контролер флоту: запускає агентів, веде власну модель світу і керує
//! ними через транспорт та площину керування.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::agent::Agent;
use crate::core::{AgentError, AgentExit, AgentId, ControlSignal, Direction, Position};
use crate::environment::Environment;
use crate::knowledge::{Knowledge, KnowledgeGrid};
use crate::protocol::{Command, Response};
use crate::settings::Settings;
use crate::transport::{self, ControllerLink, TransportError};

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("агент №{index}: недопустима стартова позиція {position}: {reason}")]
    InvalidStart {
        index: usize,
        position: Position,
        reason: &'static str,
    },
    #[error("немає агента з id {0}")]
    UnknownAgent(AgentId),
    #[error("агента {id} втрачено: {source}")]
    AgentLost {
        id: AgentId,
        #[source]
        source: TransportError,
    },
    #[error("агент {id} відповів '{response}' на '{command}'")]
    UnexpectedResponse {
        id: AgentId,
        command: String,
        response: String,
    },
}

/// Один агент або весь флот.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    One(AgentId),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Treasure,
    Water,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { to: Position, probe: Probe },
    Blocked { toward: Position },
    Collision { with: AgentId, at: Position },
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveReport {
    pub id: AgentId,
    pub direction: Direction,
    pub outcome: MoveOutcome,
    /// `true` лише для ходу, яким знайдено останній скарб.
    pub discovery_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub id: AgentId,
    pub at: Position,
    pub probe: Probe,
    pub discovery_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub id: AgentId,
    pub position: Position,
    pub charge: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Failed(String),
    Lost(String),
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "{code}"),
            ExitStatus::Failed(reason) => write!(f, "збій ({reason})"),
            ExitStatus::Lost(reason) => write!(f, "втрачено ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentFinal {
    pub id: AgentId,
    pub last: Option<(Position, u8)>,
    pub exit: ExitStatus,
}

/// Підсумок завершення роботи флоту.
#[derive(Debug, Clone)]
pub struct FinalReport {
    pub agents: Vec<AgentFinal>,
    pub treasures_found: BTreeSet<Position>,
    pub n_treasures: usize,
    pub knowledge: KnowledgeGrid,
}

impl FinalReport {
    pub fn all_found(&self) -> bool {
        self.treasures_found.len() >= self.n_treasures
    }
}

impl fmt::Display for FinalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for agent in &self.agents {
            match agent.last {
                Some((position, charge)) => writeln!(
                    f,
                    "Агент {}: останнє повідомлення {} заряд {}; статус виходу {}",
                    agent.id, position, charge, agent.exit
                )?,
                None => writeln!(
                    f,
                    "Агент {}: без останнього повідомлення; статус виходу {}",
                    agent.id, agent.exit
                )?,
            }
        }
        writeln!(
            f,
            "Скарбів знайдено {}/{}. {}",
            self.treasures_found.len(),
            self.n_treasures,
            if self.all_found() {
                "Усі скарби знайдено!"
            } else {
                "Деякі скарби лишились незнайденими."
            }
        )?;
        write!(f, "{}", self.knowledge)
    }
}

struct AgentHandle {
    link: ControllerLink,
    control: mpsc::Sender<ControlSignal>,
    task: JoinHandle<Result<AgentExit, AgentError>>,
}

pub struct Controller {
    environment: Arc<dyn Environment>,
    agents: BTreeMap<AgentId, AgentHandle>,
    beliefs: BTreeMap<AgentId, Position>,
    knowledge: KnowledgeGrid,
    treasures_found: BTreeSet<Position>,
    discovery_announced: bool,
    lost: BTreeMap<AgentId, String>,
    settings: Settings,
}

fn validate_starts(environment: &dyn Environment, starts: &[Position]) -> Result<(), ControllerError> {
    let mut taken = BTreeSet::new();
    for (index, &position) in starts.iter().enumerate() {
        let reason = if !environment.contains(position) {
            Some("поза межами кімнати")
        } else if !environment.with_obstacle(position.row, position.col) {
            Some("перешкода")
        } else if !taken.insert(position) {
            Some("зайнята іншим агентом")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(ControllerError::InvalidStart {
                index: index + 1,
                position,
                reason,
            });
        }
    }
    Ok(())
}

impl Controller {
    /// Перевіряє всі стартові позиції, потім запускає агентів з id 1, 2, ...
    /// Має викликатись у контексті tokio runtime.
    pub fn spawn(
        environment: Arc<dyn Environment>,
        starts: &[Position],
        settings: Settings,
    ) -> Result<Self, ControllerError> {
        validate_starts(environment.as_ref(), starts)?;

        let (rows, cols) = environment.dimensions();
        let mut controller = Self {
            environment: environment.clone(),
            agents: BTreeMap::new(),
            beliefs: BTreeMap::new(),
            knowledge: KnowledgeGrid::new(rows, cols),
            treasures_found: BTreeSet::new(),
            discovery_announced: false,
            lost: BTreeMap::new(),
            settings,
        };

        for (index, &start) in starts.iter().enumerate() {
            let id = index as AgentId + 1;
            let (link, agent_link) = transport::channel(controller.settings.transport.buffer_bytes);
            let (control, control_rx) =
                mpsc::channel(controller.settings.transport.control_capacity.max(1));
            let agent = Agent::new(
                id,
                start,
                controller.settings.fleet.initial_charge,
                environment.clone(),
                controller.settings.agent.clone(),
            );

            // Запуск агента в окремому асинхронному таску
            let task = tokio::spawn(async move {
                let result = agent.run(agent_link, control_rx).await;
                if let Err(e) = &result {
                    error!("Роботу агента {} перервано: {}", id, e);
                }
                result
            });

            info!(agent_id = id, position = %start, "Агента запущено");
            controller.agents.insert(
                id,
                AgentHandle {
                    link: link.with_request_timeout(controller.settings.transport.request_timeout()),
                    control,
                    task,
                },
            );
            controller.beliefs.insert(id, start);
        }

        Ok(controller)
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    pub fn belief(&self, id: AgentId) -> Option<Position> {
        self.beliefs.get(&id).copied()
    }

    pub fn knowledge(&self) -> &KnowledgeGrid {
        &self.knowledge
    }

    pub fn treasures_found(&self) -> &BTreeSet<Position> {
        &self.treasures_found
    }

    pub fn all_treasures_found(&self) -> bool {
        self.discovery_announced
    }

    /// Розгортає ціль у список id за зростанням.
    pub fn targets(&self, target: Target) -> Result<Vec<AgentId>, ControllerError> {
        match target {
            Target::All => Ok(self.ids()),
            Target::One(id) if self.agents.contains_key(&id) => Ok(vec![id]),
            Target::One(id) => Err(ControllerError::UnknownAgent(id)),
        }
    }

    pub async fn move_agent(
        &mut self,
        id: AgentId,
        direction: Direction,
    ) -> Result<MoveReport, ControllerError> {
        let from = self.belief(id).ok_or(ControllerError::UnknownAgent(id))?;
        let to = from.step(direction);
        let report = |outcome, discovery_complete| MoveReport {
            id,
            direction,
            outcome,
            discovery_complete,
        };

        // Перевірка колізії за кешованими позиціями, без звернення до агентів.
        if let Some(other) = self
            .beliefs
            .iter()
            .find(|(other, at)| **other != id && **at == to)
            .map(|(other, _)| *other)
        {
            info!(agent_id = id, with = other, %to, "Колізію відхилено локально");
            return Ok(report(MoveOutcome::Collision { with: other, at: to }, false));
        }

        let command = Command::Move(direction);
        match self.request(id, command).await? {
            Response::Ok => {
                self.beliefs.insert(id, to);
                let (probe, complete) = self.probe_at(id, to).await?;
                Ok(report(MoveOutcome::Moved { to, probe }, complete))
            }
            Response::Ko => {
                if self.environment.contains(to) {
                    self.knowledge.mark(to, Knowledge::Blocked);
                }
                Ok(report(MoveOutcome::Blocked { toward: to }, false))
            }
            Response::Stopped => Ok(report(MoveOutcome::Stopped, false)),
            other => Err(unexpected(id, &command, &other)),
        }
    }

    /// Рухає весь флот по черзі за зростанням id. Кожен наступний агент
    /// бачить уже оновлені позиції попередніх. Зупиняється, щойно знайдено
    /// останній скарб.
    pub async fn broadcast_move(
        &mut self,
        direction: Direction,
    ) -> Vec<(AgentId, Result<MoveReport, ControllerError>)> {
        let mut reports = Vec::new();
        for id in self.ids() {
            let result = self.move_agent(id, direction).await;
            let complete = matches!(&result, Ok(r) if r.discovery_complete);
            reports.push((id, result));
            if complete {
                break;
            }
        }
        reports
    }

    /// Перевіряє на скарб клітинку, де контролер вважає агента.
    pub async fn treasure_probe(&mut self, id: AgentId) -> Result<ProbeReport, ControllerError> {
        let at = self.belief(id).ok_or(ControllerError::UnknownAgent(id))?;
        let (probe, discovery_complete) = self.probe_at(id, at).await?;
        Ok(ProbeReport {
            id,
            at,
            probe,
            discovery_complete,
        })
    }

    /// `None`, якщо агент призупинений і не відповідає на запити.
    pub async fn battery(&mut self, id: AgentId) -> Result<Option<u8>, ControllerError> {
        match self.request(id, Command::Battery).await? {
            Response::Charge(charge) => Ok(Some(charge)),
            Response::Stopped => Ok(None),
            other => Err(unexpected(id, &Command::Battery, &other)),
        }
    }

    pub async fn position(&mut self, id: AgentId) -> Result<Option<Position>, ControllerError> {
        match self.request(id, Command::Position).await? {
            Response::At(position) => {
                if self.belief(id) != Some(position) {
                    warn!(agent_id = id, %position, belief = ?self.belief(id), "Позиція розходиться з очікуваною");
                }
                Ok(Some(position))
            }
            Response::Stopped => Ok(None),
            other => Err(unexpected(id, &Command::Position, &other)),
        }
    }

    pub async fn signal(&mut self, id: AgentId, signal: ControlSignal) -> Result<(), ControllerError> {
        let handle = self.agents.get(&id).ok_or(ControllerError::UnknownAgent(id))?;
        if handle.control.send(signal).await.is_err() {
            // Канал керування закривається лише разом із задачею агента.
            return Err(self.lose(id, TransportError::Closed));
        }
        info!(agent_id = id, ?signal, "Сигнал надіслано");
        Ok(())
    }

    pub async fn suspend(&mut self, id: AgentId) -> Result<(), ControllerError> {
        self.signal(id, ControlSignal::Suspend).await
    }

    pub async fn resume(&mut self, id: AgentId) -> Result<(), ControllerError> {
        self.signal(id, ControlSignal::Resume).await
    }

    pub async fn recharge(&mut self, id: AgentId) -> Result<(), ControllerError> {
        self.signal(id, ControlSignal::Recharge).await
    }

    /// Запитує знімок стану через площину керування і коротко чекає на
    /// рядок у каналі відповідей. `None`, якщо агент не встиг.
    pub async fn status(&mut self, id: AgentId) -> Result<Option<StatusSnapshot>, ControllerError> {
        let handle = self
            .agents
            .get_mut(&id)
            .ok_or(ControllerError::UnknownAgent(id))?;
        // Знімки, що запізнились після попереднього тайм-ауту.
        let stale = handle.link.discard_pending().await;
        if let Err(source) = stale {
            return Err(self.lose(id, source));
        }
        self.signal(id, ControlSignal::StatusDump).await?;
        let wait = self.settings.transport.status_wait();
        let handle = self
            .agents
            .get_mut(&id)
            .ok_or(ControllerError::UnknownAgent(id))?;
        let result = handle.link.read_unsolicited(wait).await;
        match result {
            Ok(Some(Response::Status {
                id: reported,
                position,
                charge,
            })) => Ok(Some(StatusSnapshot {
                id: reported,
                position,
                charge,
            })),
            Ok(Some(other)) => Err(ControllerError::UnexpectedResponse {
                id,
                command: "status".into(),
                response: other.encode(),
            }),
            Ok(None) => {
                warn!(agent_id = id, ?wait, "Знімок стану не надійшов вчасно");
                Ok(None)
            }
            Err(source) => Err(self.lose(id, source)),
        }
    }

    /// Надсилає `exit` кожному агенту по черзі, чекає завершення задач і
    /// збирає підсумок.
    pub async fn shutdown(mut self) -> FinalReport {
        info!(agents = self.agents.len(), "Завершення роботи флоту");
        let mut agents = Vec::new();

        for (id, handle) in std::mem::take(&mut self.agents) {
            let AgentHandle {
                mut link,
                control,
                task,
            } = handle;

            let last = match link.request(&Command::Exit).await {
                Ok(Response::Final { position, charge }) => Some((position, charge)),
                Ok(other) => {
                    warn!(agent_id = id, response = %other.encode(), "Неочікувана відповідь на exit");
                    None
                }
                Err(e) => {
                    warn!(agent_id = id, "Не вдалося отримати останній стан: {}", e);
                    None
                }
            };
            drop(link);
            drop(control);

            let exit = match task.await {
                Ok(Ok(AgentExit { code })) => ExitStatus::Exited(code),
                Ok(Err(e)) => ExitStatus::Failed(e.to_string()),
                Err(e) => ExitStatus::Failed(e.to_string()),
            };
            info!(agent_id = id, %exit, "Агент завершився");
            agents.push(AgentFinal { id, last, exit });
        }

        for (id, reason) in std::mem::take(&mut self.lost) {
            agents.push(AgentFinal {
                id,
                last: None,
                exit: ExitStatus::Lost(reason),
            });
        }
        agents.sort_by_key(|a| a.id);

        FinalReport {
            agents,
            treasures_found: std::mem::take(&mut self.treasures_found),
            n_treasures: self.environment.n_treasures(),
            knowledge: self.knowledge.clone(),
        }
    }

    async fn request(&mut self, id: AgentId, command: Command) -> Result<Response, ControllerError> {
        let handle = self
            .agents
            .get_mut(&id)
            .ok_or(ControllerError::UnknownAgent(id))?;
        let result = handle.link.request(&command).await;
        result.map_err(|source| self.lose(id, source))
    }

    async fn probe_at(&mut self, id: AgentId, at: Position) -> Result<(Probe, bool), ControllerError> {
        match self.request(id, Command::Treasure).await? {
            Response::Treasure => {
                self.knowledge.mark(at, Knowledge::VisitedTreasure);
                Ok((Probe::Treasure, self.note_treasure(at)))
            }
            Response::Water => {
                self.knowledge.mark(at, Knowledge::VisitedEmpty);
                Ok((Probe::Water, false))
            }
            Response::Stopped => Ok((Probe::Stopped, false)),
            other => Err(unexpected(id, &Command::Treasure, &other)),
        }
    }

    /// Повертає `true` лише тоді, коли цей скарб завершив пошук.
    fn note_treasure(&mut self, at: Position) -> bool {
        if !self.treasures_found.insert(at) {
            return false;
        }
        let total = self.environment.n_treasures();
        info!(%at, found = self.treasures_found.len(), total, "Знайдено скарб");
        if !self.discovery_announced && self.treasures_found.len() >= total {
            self.discovery_announced = true;
            info!("Усі скарби знайдено");
            return true;
        }
        false
    }

    /// Агент із несправним транспортом виключається з флоту.
    fn lose(&mut self, id: AgentId, source: TransportError) -> ControllerError {
        if let Some(handle) = self.agents.remove(&id) {
            handle.task.abort();
        }
        self.beliefs.remove(&id);
        error!(agent_id = id, "Агента втрачено: {}", source);
        self.lost.insert(id, source.to_string());
        ControllerError::AgentLost { id, source }
    }
}

fn unexpected(id: AgentId, command: &Command, response: &Response) -> ControllerError {
    ControllerError::UnexpectedResponse {
        id,
        command: command.encode(),
        response: response.encode(),
    }
}
