//! Інтерактивна оболонка оператора поверх контролера.
use std::future::Future;
use std::io::Write;
use std::num::ParseIntError;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::controller::{Controller, FinalReport, MoveOutcome, MoveReport, Probe, Target};
use crate::core::{AgentId, ControlSignal, Direction, DirectionParseError};

const HELP: &str = "\
mv <id|all> <up|down|left|right>  крок агента
bat <id|all>                       заряд батареї
pos <id|all>                       позиція агента
tr <id|all>                        перевірити клітинку на скарб
suspend <id|all>                   призупинити
resume <id|all>                    відновити
recharge <id|all>                  зарядити до 100
status <id|all>                    позасмуговий знімок стану
exit                               завершити роботу флоту";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperatorParseError {
    #[error("порожня команда")]
    Empty,
    #[error("невідома команда: {0}")]
    UnknownCommand(String),
    #[error("бракує аргументу: {0}")]
    MissingArgument(&'static str),
    #[error("некоректний id агента '{value}': {source}")]
    InvalidAgent {
        value: String,
        source: ParseIntError,
    },
    #[error(transparent)]
    Direction(#[from] DirectionParseError),
    #[error("зайві аргументи: {0}")]
    TrailingInput(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Move { target: Target, direction: Direction },
    Battery(Target),
    Position(Target),
    Treasure(Target),
    Signal { target: Target, signal: ControlSignal },
    Status(Target),
    Exit,
    Help,
}

pub fn parse_operator_line(input: &str) -> Result<OperatorCommand, OperatorParseError> {
    let mut parts = input.split_whitespace();
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(OperatorParseError::Empty)?;

    let command = match verb.as_str() {
        "mv" => {
            let target = parse_target(parts.next())?;
            let direction = parts
                .next()
                .ok_or(OperatorParseError::MissingArgument("direction"))?
                .parse()?;
            OperatorCommand::Move { target, direction }
        }
        "bat" => OperatorCommand::Battery(parse_target(parts.next())?),
        "pos" => OperatorCommand::Position(parse_target(parts.next())?),
        "tr" => OperatorCommand::Treasure(parse_target(parts.next())?),
        "suspend" => OperatorCommand::Signal {
            target: parse_target(parts.next())?,
            signal: ControlSignal::Suspend,
        },
        "resume" => OperatorCommand::Signal {
            target: parse_target(parts.next())?,
            signal: ControlSignal::Resume,
        },
        "recharge" => OperatorCommand::Signal {
            target: parse_target(parts.next())?,
            signal: ControlSignal::Recharge,
        },
        "status" => OperatorCommand::Status(parse_target(parts.next())?),
        "exit" | "quit" => OperatorCommand::Exit,
        "help" | "?" => OperatorCommand::Help,
        other => return Err(OperatorParseError::UnknownCommand(other.to_string())),
    };

    let rest: Vec<&str> = parts.collect();
    if !rest.is_empty() {
        return Err(OperatorParseError::TrailingInput(rest.join(" ")));
    }
    Ok(command)
}

fn parse_target(value: Option<&str>) -> Result<Target, OperatorParseError> {
    let value = value.ok_or(OperatorParseError::MissingArgument("id|all"))?;
    if value.eq_ignore_ascii_case("all") {
        return Ok(Target::All);
    }
    value
        .parse::<AgentId>()
        .map(Target::One)
        .map_err(|source| OperatorParseError::InvalidAgent {
            value: value.to_string(),
            source,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// Цикл команд оператора. Завершується командою `exit`, кінцем вводу,
/// перериванням або знаходженням усіх скарбів; після цього флот
/// завершує роботу і підсумок виводиться в `out`.
pub async fn run<R, W, I>(
    mut controller: Controller,
    input: R,
    out: &mut W,
    interrupt: I,
) -> std::io::Result<FinalReport>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    I: Future<Output = ()>,
{
    let mut lines = input.lines();
    tokio::pin!(interrupt);

    loop {
        write!(out, "Command: ")?;
        out.flush()?;

        let line = tokio::select! {
            biased;
            _ = &mut interrupt => {
                writeln!(out, "\nОтримано переривання. Завершення роботи.")?;
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            writeln!(out)?;
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_operator_line(&line) {
            Ok(command) => {
                if execute(&mut controller, command, out).await? == Flow::Shutdown {
                    break;
                }
            }
            Err(e) => writeln!(out, "Помилка: {e}")?,
        }
    }

    let report = controller.shutdown().await;
    write!(out, "{report}")?;
    out.flush()?;
    Ok(report)
}

async fn execute<W: Write>(
    controller: &mut Controller,
    command: OperatorCommand,
    out: &mut W,
) -> std::io::Result<Flow> {
    let targets = match command {
        OperatorCommand::Exit => return Ok(Flow::Shutdown),
        OperatorCommand::Help => {
            writeln!(out, "{HELP}")?;
            return Ok(Flow::Continue);
        }
        OperatorCommand::Move { target, .. }
        | OperatorCommand::Battery(target)
        | OperatorCommand::Position(target)
        | OperatorCommand::Treasure(target)
        | OperatorCommand::Signal { target, .. }
        | OperatorCommand::Status(target) => match controller.targets(target) {
            Ok(ids) => ids,
            Err(e) => {
                writeln!(out, "{e}")?;
                return Ok(Flow::Continue);
            }
        },
    };

    match command {
        OperatorCommand::Move {
            target: Target::All,
            direction,
        } => {
            for (id, result) in controller.broadcast_move(direction).await {
                match result {
                    Ok(report) => {
                        if print_move(out, &report)? {
                            return Ok(Flow::Shutdown);
                        }
                    }
                    Err(e) => writeln!(out, "Агент {id}: {e}")?,
                }
            }
        }
        OperatorCommand::Move { direction, .. } => {
            for id in targets {
                match controller.move_agent(id, direction).await {
                    Ok(report) => {
                        if print_move(out, &report)? {
                            return Ok(Flow::Shutdown);
                        }
                    }
                    Err(e) => writeln!(out, "Агент {id}: {e}")?,
                }
            }
        }
        OperatorCommand::Battery(_) => {
            for id in targets {
                match controller.battery(id).await {
                    Ok(Some(charge)) => writeln!(out, "Агент {id}: заряд {charge}")?,
                    Ok(None) => writeln!(out, "Агент {id}: призупинений")?,
                    Err(e) => writeln!(out, "Агент {id}: {e}")?,
                }
            }
        }
        OperatorCommand::Position(_) => {
            for id in targets {
                match controller.position(id).await {
                    Ok(Some(position)) => writeln!(out, "Агент {id}: позиція {position}")?,
                    Ok(None) => writeln!(out, "Агент {id}: призупинений")?,
                    Err(e) => writeln!(out, "Агент {id}: {e}")?,
                }
            }
        }
        OperatorCommand::Treasure(_) => {
            for id in targets {
                match controller.treasure_probe(id).await {
                    Ok(report) => {
                        writeln!(out, "Агент {id}: {} у {}", probe_label(report.probe), report.at)?;
                        if report.discovery_complete {
                            writeln!(out, "Усі скарби знайдено!")?;
                            return Ok(Flow::Shutdown);
                        }
                    }
                    Err(e) => writeln!(out, "Агент {id}: {e}")?,
                }
            }
        }
        OperatorCommand::Signal { signal, .. } => {
            for id in targets {
                match controller.signal(id, signal).await {
                    Ok(()) => writeln!(out, "Агент {id}: {}", signal_label(signal))?,
                    Err(e) => writeln!(out, "Агент {id}: {e}")?,
                }
            }
        }
        OperatorCommand::Status(_) => {
            for id in targets {
                match controller.status(id).await {
                    Ok(Some(s)) => writeln!(out, "id: {} P: {} Bat: {}", s.id, s.position, s.charge)?,
                    Ok(None) => writeln!(out, "Агент {id}: знімок стану не надійшов")?,
                    Err(e) => writeln!(out, "Агент {id}: {e}")?,
                }
            }
        }
        OperatorCommand::Exit | OperatorCommand::Help => {}
    }
    Ok(Flow::Continue)
}

/// Друкує результат ходу. Повертає `true`, якщо знайдено останній скарб.
fn print_move<W: Write>(out: &mut W, report: &MoveReport) -> std::io::Result<bool> {
    let id = report.id;
    let direction = report.direction;
    match report.outcome {
        MoveOutcome::Moved { to, probe } => {
            writeln!(out, "Агент {id}: OK; {direction} до {to}")?;
            if probe != Probe::Water {
                writeln!(out, "Агент {id}: {} у {to}", probe_label(probe))?;
            }
        }
        MoveOutcome::Blocked { toward } => {
            writeln!(out, "Агент {id}: не може рухатись {direction} ({toward})")?
        }
        MoveOutcome::Collision { with, at } => {
            writeln!(out, "Агент {id}: Collision з агентом {with} у {at}")?
        }
        MoveOutcome::Stopped => writeln!(out, "Агент {id}: stopped")?,
    }
    if report.discovery_complete {
        writeln!(out, "Усі скарби знайдено!")?;
    }
    Ok(report.discovery_complete)
}

fn probe_label(probe: Probe) -> &'static str {
    match probe {
        Probe::Treasure => "Treasure",
        Probe::Water => "Water",
        Probe::Stopped => "stopped",
    }
}

fn signal_label(signal: ControlSignal) -> &'static str {
    match signal {
        ControlSignal::Suspend => "призупинено",
        ControlSignal::Resume => "відновлено",
        ControlSignal::Recharge => "заряджено",
        ControlSignal::StatusDump => "знімок запитано",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::Position;
    use crate::environment::Grid;
    use crate::settings::{AgentSettings, Settings};

    fn quiet_settings() -> Settings {
        Settings {
            agent: AgentSettings {
                drain_period_ms: 3_600_000,
                ..AgentSettings::default()
            },
            ..Settings::default()
        }
    }

    #[test]
    fn test_parse_move_variants() {
        assert_eq!(
            parse_operator_line("mv 2 left").unwrap(),
            OperatorCommand::Move {
                target: Target::One(2),
                direction: Direction::Left
            }
        );
        assert_eq!(
            parse_operator_line("MV all Up").unwrap(),
            OperatorCommand::Move {
                target: Target::All,
                direction: Direction::Up
            }
        );
    }

    #[test]
    fn test_parse_control_plane_commands() {
        assert_eq!(
            parse_operator_line("suspend all").unwrap(),
            OperatorCommand::Signal {
                target: Target::All,
                signal: ControlSignal::Suspend
            }
        );
        assert_eq!(
            parse_operator_line("recharge 3").unwrap(),
            OperatorCommand::Signal {
                target: Target::One(3),
                signal: ControlSignal::Recharge
            }
        );
        assert_eq!(
            parse_operator_line("status all").unwrap(),
            OperatorCommand::Status(Target::All)
        );
        assert_eq!(parse_operator_line("exit").unwrap(), OperatorCommand::Exit);
    }

    #[test]
    fn test_parse_errors_are_specific() {
        assert_eq!(parse_operator_line("   "), Err(OperatorParseError::Empty));
        assert_eq!(
            parse_operator_line("mv 1"),
            Err(OperatorParseError::MissingArgument("direction"))
        );
        assert_eq!(
            parse_operator_line("bat"),
            Err(OperatorParseError::MissingArgument("id|all"))
        );
        assert!(matches!(
            parse_operator_line("mv 1 north"),
            Err(OperatorParseError::Direction(_))
        ));
        assert!(matches!(
            parse_operator_line("pos one"),
            Err(OperatorParseError::InvalidAgent { .. })
        ));
        assert!(matches!(
            parse_operator_line("fly 1"),
            Err(OperatorParseError::UnknownCommand(_))
        ));
        assert!(matches!(
            parse_operator_line("bat 1 2"),
            Err(OperatorParseError::TrailingInput(_))
        ));
    }

    #[tokio::test]
    async fn test_session_shuts_down_after_last_treasure() {
        let grid = Arc::new(Grid::parse(".T\n..").unwrap());
        let controller = Controller::spawn(grid, &[Position::new(0, 0)], quiet_settings()).unwrap();

        let input: &[u8] = b"jump\nmv 1 right\nbat 1\n";
        let mut out = Vec::new();
        let report = run(controller, input, &mut out, std::future::pending::<()>())
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Помилка: невідома команда: jump"));
        assert!(text.contains("Агент 1: OK; right до (0, 1)"));
        assert!(text.contains("Усі скарби знайдено!"));
        assert!(text.contains("Агент 1: останнє повідомлення (0, 1) заряд 95; статус виходу 0"));
        assert!(!text.contains("Агент 1: заряд 95"));
        assert_eq!(report.agents[0].last, Some((Position::new(0, 1), 95)));
    }

    #[tokio::test]
    async fn test_session_reports_suspension_and_collision() {
        let grid = Arc::new(Grid::parse("..T\n...").unwrap());
        let controller = Controller::spawn(
            grid,
            &[Position::new(0, 0), Position::new(0, 1)],
            quiet_settings(),
        )
        .unwrap();

        let input: &[u8] = b"mv 1 right\nsuspend all\nmv all down\nstatus 2\nmv 7 up\nexit\n";
        let mut out = Vec::new();
        let report = run(controller, input, &mut out, std::future::pending::<()>())
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Агент 1: Collision з агентом 2 у (0, 1)"));
        assert!(text.contains("Агент 1: stopped"));
        assert!(text.contains("Агент 2: stopped"));
        assert!(text.contains("id: 2 P: (0, 1) Bat: 100"));
        assert!(text.contains("немає агента з id 7"));
        assert_eq!(report.agents.len(), 2);
        assert!(!report.all_found());
    }

    #[tokio::test]
    async fn test_interrupt_triggers_shutdown() {
        let grid = Arc::new(Grid::parse("..").unwrap());
        let controller = Controller::spawn(grid, &[Position::new(0, 0)], quiet_settings()).unwrap();

        let input: &[u8] = b"bat 1\n";
        let mut out = Vec::new();
        let report = run(controller, input, &mut out, std::future::ready(()))
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Отримано переривання"));
        assert!(!text.contains("Агент 1: заряд"));
        assert_eq!(report.agents[0].last, Some((Position::new(0, 0), 100)));
    }
}
