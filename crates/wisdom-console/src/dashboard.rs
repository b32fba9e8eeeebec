use std::fmt::Write;
use tokio::sync::watch;
use wisdom_core::format::scale_complexity;
use wisdom_core::{Command, ConsoleView, Operation, PollState};

/// A line typed at the `watch` prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Quit,
}

pub const HELP: &str = "keys: q=quote c=challenge s=start load x=stop load r=refresh exit=quit";

pub fn parse_input(line: &str) -> Option<Input> {
    let input = match line.trim() {
        "q" => Input::Command(Command::Invoke(Operation::FetchQuote)),
        "c" => Input::Command(Command::Invoke(Operation::FetchChallenge)),
        "s" => Input::Command(Command::Invoke(Operation::StartLoad)),
        "x" => Input::Command(Command::Invoke(Operation::StopLoad)),
        "r" => Input::Command(Command::Refresh),
        "exit" | "quit" => Input::Quit,
        _ => return None,
    };
    Some(input)
}

fn control(view: &ConsoleView, op: Operation, key: char) -> String {
    if view.controls.is_in_flight(op) {
        format!("[{key}] {} ...", op.label())
    } else if view.controls.is_enabled(op) {
        format!("[{key}] {}", op.label())
    } else {
        format!(" {key}  {} (off)", op.label())
    }
}

/// Render the view. The challenge block is included only when
/// `show_challenge` is set, so a challenge is surfaced once per fetch.
pub fn render(view: &ConsoleView, show_challenge: bool) -> String {
    let m = &view.model;
    let mut out = String::new();

    let _ = writeln!(out, "=== Word of Wisdom – Console ===");
    if let Some(err) = &view.error {
        let _ = writeln!(out, "!! {}", err);
    }

    if let Some(quote) = &view.quote {
        let _ = writeln!(out, "\"{}\"", quote.text);
        let _ = writeln!(out, "    -- {}", quote.author);
    }
    if let Some(ch) = view.challenge.as_ref().filter(|_| show_challenge) {
        let _ = writeln!(out, "Challenge #{} : {} (rev {})", ch.challenge_id, ch.task, view.challenge_revision);
        let _ = writeln!(
            out,
            "  level {}  N={} r={} p={} keyLen={}  complexity {}",
            ch.difficulty_level,
            ch.scrypt_n,
            ch.scrypt_r,
            ch.scrypt_p,
            ch.key_len,
            scale_complexity(ch.estimated_complexity)
        );
    }

    let _ = writeln!(out, "Requests       : {} ({} ok / {} failed)", m.requests, m.success, m.failure);
    let _ = writeln!(out, "Difficulty     : {} (level {})", m.difficulty, m.difficulty_level);
    let _ = writeln!(out, "scrypt r / p   : {} / {}", m.scrypt_r, m.scrypt_p);
    let _ = writeln!(out, "Complexity     : {}", m.complexity);
    let _ = writeln!(
        out,
        "Solve time     : avg {}  min {}  max {}  last {}",
        m.avg_solve, m.min_solve, m.max_solve, m.last_solve
    );
    let _ = writeln!(
        out,
        "Load test      : {} ({} requests, {} req/s)",
        if m.load_test_active { "active" } else { "idle" },
        m.load_requests,
        m.load_rps
    );
    let polling = match view.poll {
        PollState::Polling => "polling",
        PollState::Idle => "idle",
    };
    let updated = view
        .last_updated
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".into());
    let _ = writeln!(out, "Stats          : {} (updated {})", polling, updated);

    let controls = [
        control(view, Operation::FetchQuote, 'q'),
        control(view, Operation::FetchChallenge, 'c'),
        control(view, Operation::StartLoad, 's'),
        control(view, Operation::StopLoad, 'x'),
    ];
    let _ = writeln!(out, "{}", controls.join("  "));
    out
}

/// Tracks which challenge revision has already been shown.
#[derive(Debug, Default)]
pub struct Frames {
    shown_revision: u64,
}

impl Frames {
    pub fn next(&mut self, view: &ConsoleView) -> String {
        let fresh = view.challenge_revision != self.shown_revision;
        self.shown_revision = view.challenge_revision;
        render(view, fresh)
    }
}

/// Prints the view every time the session publishes a change.
/// Ends when the session drops its sender.
pub async fn launch_dashboard(mut rx: watch::Receiver<ConsoleView>) {
    let mut frames = Frames::default();
    loop {
        let view = rx.borrow_and_update().clone();
        println!("{}", frames.next(&view));

        if rx.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wisdom_core::{Challenge, ChallengeResponse, Completion, Console, Label, StatsOrigin, StatsSnapshot};

    fn console_with_challenge() -> Console {
        let mut console = Console::new(Duration::from_secs(1), false);
        console.begin(Operation::FetchChallenge).unwrap();
        console.complete(Completion::Challenge(Ok(ChallengeResponse {
            success: true,
            challenge: Some(Challenge {
                challenge_id: "c-1".to_string(),
                task: "find nonce".to_string(),
                difficulty_level: Label::Level(1),
                scrypt_n: 16384,
                scrypt_r: 8,
                scrypt_p: 1,
                key_len: 32,
                estimated_complexity: 67108864.0,
            }),
            stats: None,
            error: None,
        })));
        console
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(
            parse_input(" q "),
            Some(Input::Command(Command::Invoke(Operation::FetchQuote)))
        );
        assert_eq!(
            parse_input("x"),
            Some(Input::Command(Command::Invoke(Operation::StopLoad)))
        );
        assert_eq!(parse_input("r"), Some(Input::Command(Command::Refresh)));
        assert_eq!(parse_input("exit"), Some(Input::Quit));
        assert_eq!(parse_input("help"), None);
    }

    #[test]
    fn test_render_fresh_view() {
        let view = Console::new(Duration::from_secs(1), false).view();
        let text = render(&view, true);
        assert!(text.contains("Requests       : 0 (0 ok / 0 failed)"));
        assert!(text.contains("Complexity     : N/A"));
        assert!(text.contains("Load test      : idle (0 requests, 0 req/s)"));
        assert!(text.contains("x  load stop (off)"));
        assert!(!text.contains("!!"));
    }

    #[test]
    fn test_render_error_banner() {
        let mut view = Console::new(Duration::from_secs(1), false).view();
        view.error = Some("Failed to get quote".to_string());
        assert!(render(&view, false).contains("!! Failed to get quote"));
    }

    #[test]
    fn test_in_flight_marker() {
        let mut console = Console::new(Duration::from_secs(1), false);
        console.begin(Operation::FetchQuote).unwrap();
        assert!(render(&console.view(), false).contains("[q] quote ..."));
    }

    #[test]
    fn test_challenge_shows_complexity() {
        let view = console_with_challenge().view();
        let text = render(&view, true);
        assert!(text.contains("Challenge #c-1 : find nonce (rev 1)"));
        assert!(text.contains("N=16384 r=8 p=1 keyLen=32  complexity 67.11 Mega"));
    }

    #[test]
    fn test_challenge_surfaced_once_per_fetch() {
        let mut console = console_with_challenge();
        let mut frames = Frames::default();

        assert!(frames.next(&console.view()).contains("Challenge #c-1"));

        console.complete(Completion::Stats {
            origin: StatsOrigin::Manual,
            epoch: console.epoch(),
            result: Ok(StatsSnapshot {
                request_count: Some(3),
                ..Default::default()
            }),
        });
        let text = frames.next(&console.view());
        assert!(text.contains("Requests       : 3"));
        assert!(!text.contains("Challenge #"));

        console.begin(Operation::FetchChallenge).unwrap();
        assert!(!frames.next(&console.view()).contains("Challenge #"));
        console.complete(Completion::Challenge(Ok(ChallengeResponse {
            success: true,
            challenge: console.challenge().cloned(),
            stats: None,
            error: None,
        })));
        assert!(frames.next(&console.view()).contains("(rev 2)"));
    }
}
