//! Дуплексний канал на агента: два односпрямовані байтові потоки з
//! текстовими рядками.
use std::time::Duration;

use thiserror::Error;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::time::timeout;
use tracing::debug;

use crate::protocol::{Command, ProtocolError, Response};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("агент закрив канал")]
    Closed,
    #[error("агент не відповів за {0:?}")]
    TimedOut(Duration),
    #[error("помилка вводу-виводу: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Створює пару кінців транспорту. `capacity` - буфер кожного потоку в байтах.
pub fn channel(capacity: usize) -> (ControllerLink, AgentLink) {
    let (command_tx, command_rx) = duplex(capacity);
    let (response_tx, response_rx) = duplex(capacity);
    (
        ControllerLink {
            commands: command_tx,
            responses: BufReader::new(response_rx).lines(),
            request_timeout: None,
        },
        AgentLink {
            commands: BufReader::new(command_rx).lines(),
            responses: response_tx,
        },
    )
}

/// Кінець контролера: пише команди, читає відповіді.
pub struct ControllerLink {
    commands: DuplexStream,
    responses: Lines<BufReader<DuplexStream>>,
    request_timeout: Option<Duration>,
}

impl ControllerLink {
    pub fn with_request_timeout(mut self, limit: Option<Duration>) -> Self {
        self.request_timeout = limit;
        self
    }

    /// Надсилає команду і чекає на її відповідь. Знімки стану, що лишилися
    /// в потоці після попередніх запитів, пропускаються.
    pub async fn request(&mut self, command: &Command) -> Result<Response, TransportError> {
        let mut line = command.encode();
        line.push('\n');
        self.commands.write_all(line.as_bytes()).await?;
        self.commands.flush().await?;

        match self.request_timeout {
            Some(limit) => timeout(limit, self.await_reply())
                .await
                .map_err(|_| TransportError::TimedOut(limit))?,
            None => self.await_reply().await,
        }
    }

    /// Чекає на непрошений рядок (знімок стану) не довше `wait`.
    pub async fn read_unsolicited(
        &mut self,
        wait: Duration,
    ) -> Result<Option<Response>, TransportError> {
        match timeout(wait, self.read_response()).await {
            Ok(response) => response.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Відкидає рядки, що вже лежать у потоці відповідей. Повертає їх кількість.
    pub async fn discard_pending(&mut self) -> Result<usize, TransportError> {
        let mut discarded = 0;
        while let Ok(response) = timeout(Duration::ZERO, self.read_response()).await {
            let response = response?;
            debug!(line = %response.encode(), "Відкинуто застарілий рядок");
            discarded += 1;
        }
        Ok(discarded)
    }

    #[cfg(test)]
    pub(crate) async fn write_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.commands.write_all(bytes).await?;
        self.commands.flush().await
    }

    async fn await_reply(&mut self) -> Result<Response, TransportError> {
        loop {
            match self.read_response().await? {
                Response::Status { id, .. } => {
                    debug!(agent_id = id, "Пропущено застарілий знімок стану");
                }
                response => return Ok(response),
            }
        }
    }

    async fn read_response(&mut self) -> Result<Response, TransportError> {
        let line = self
            .responses
            .next_line()
            .await?
            .ok_or(TransportError::Closed)?;
        Ok(Response::parse(&line)?)
    }
}

/// Кінець агента: читає команди, пише відповіді.
pub struct AgentLink {
    commands: Lines<BufReader<DuplexStream>>,
    responses: DuplexStream,
}

impl AgentLink {
    /// Наступний рядок команди; `None` означає, що контролер закрив канал.
    /// Безпечно скасовується всередині `select!`.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.commands.next_line().await
    }

    pub async fn send(&mut self, response: &Response) -> std::io::Result<()> {
        let mut line = response.encode();
        line.push('\n');
        self.responses.write_all(line.as_bytes()).await?;
        self.responses.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Position;

    #[tokio::test]
    async fn test_request_reads_one_reply() {
        let (mut controller, mut agent) = channel(1024);

        let echo = tokio::spawn(async move {
            let line = agent.next_line().await.unwrap().unwrap();
            assert_eq!(line, "bat");
            agent.send(&Response::Charge(88)).await.unwrap();
            agent
        });

        let reply = controller.request(&Command::Battery).await.unwrap();
        assert_eq!(reply, Response::Charge(88));
        echo.await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_status_lines_are_skipped() {
        let (mut controller, mut agent) = channel(1024);
        agent
            .send(&Response::Status {
                id: 1,
                position: Position::new(0, 0),
                charge: 50,
            })
            .await
            .unwrap();
        agent.send(&Response::Water).await.unwrap();

        let reply = controller.request(&Command::Treasure).await.unwrap();
        assert_eq!(reply, Response::Water);
    }

    #[tokio::test]
    async fn test_dropped_agent_closes_channel() {
        let (mut controller, agent) = channel(1024);
        drop(agent);
        assert!(matches!(
            controller.request(&Command::Position).await,
            Err(TransportError::Closed) | Err(TransportError::Io(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_agent_times_out() {
        let (controller, _agent) = channel(1024);
        let mut controller = controller.with_request_timeout(Some(Duration::from_millis(50)));
        assert!(matches!(
            controller.request(&Command::Battery).await,
            Err(TransportError::TimedOut(_))
        ));
    }

    #[tokio::test]
    async fn test_discard_pending_drops_only_buffered_lines() {
        let (mut controller, mut agent) = channel(1024);
        for charge in [90, 80] {
            agent
                .send(&Response::Status {
                    id: 1,
                    position: Position::new(0, 0),
                    charge,
                })
                .await
                .unwrap();
        }

        assert_eq!(controller.discard_pending().await.unwrap(), 2);
        assert_eq!(controller.discard_pending().await.unwrap(), 0);

        let fresh = Response::Status {
            id: 1,
            position: Position::new(0, 0),
            charge: 70,
        };
        agent.send(&fresh).await.unwrap();
        let got = controller
            .read_unsolicited(Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(got, Some(fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsolicited_read_gives_up_quietly() {
        let (mut controller, _agent) = channel(1024);
        let got = controller
            .read_unsolicited(Duration::from_millis(20))
            .await
            .unwrap();
        assert!(got.is_none());
    }
}
