use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shipd::exec::{CommandOutcome, CommandRunner};

/// One scripted response, matched by substring against the command line.
#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    status: i32,
    output: String,
}

/// A fake command runner that never spawns a process.
///
/// Responses are scripted by substring match against the expanded command;
/// the first matching rule wins and unmatched commands succeed with empty
/// output. Every command that was "run" is recorded for assertions.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for any command containing `needle`.
    pub fn on(self, needle: &str, status: i32, output: &str) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            status,
            output: output.to_string(),
        });
        self
    }

    /// Commands executed so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn commands_matching(&self, needle: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.contains(needle))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &str, _timeout: Duration) -> CommandOutcome {
        self.commands.lock().unwrap().push(command.to_string());

        let rules = self.rules.lock().unwrap();
        for rule in rules.iter() {
            if command.contains(&rule.needle) {
                return CommandOutcome {
                    status: rule.status,
                    output: rule.output.clone(),
                };
            }
        }
        CommandOutcome {
            status: 0,
            output: String::new(),
        }
    }
}
