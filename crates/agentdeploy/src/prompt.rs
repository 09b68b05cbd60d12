//! Interactive conflict prompt on stdin

use agentdeploy_cloud::{CloudError, Conflict, ConflictPrompt, DeploymentName, Result, UserChoice};
use async_trait::async_trait;
use colored::Colorize;
use std::io::Write;

pub struct StdinPrompt;

/// Map one answer line onto a choice; `None` for unrecognized input
fn parse_choice(answer: &str) -> Option<std::result::Result<UserChoice, CloudError>> {
    let answer = answer.trim();
    let (head, rest) = answer
        .split_once(char::is_whitespace)
        .map(|(h, r)| (h, r.trim()))
        .unwrap_or((answer, ""));

    let choice = match head.to_lowercase().as_str() {
        "1" | "use" => UserChoice::UseExisting,
        "2" | "recreate" => UserChoice::DeleteAndRecreate,
        "3" | "rename" if rest.is_empty() => UserChoice::RenameAndCreate(None),
        "3" | "rename" => match DeploymentName::parse(rest) {
            Ok(name) => UserChoice::RenameAndCreate(Some(name)),
            Err(e) => return Some(Err(e)),
        },
        "4" | "abort" | "q" => UserChoice::Abort,
        _ => return None,
    };
    Some(Ok(choice))
}

#[async_trait]
impl ConflictPrompt for StdinPrompt {
    async fn choose(&self, conflict: &Conflict) -> Result<UserChoice> {
        let conflict = conflict.clone();
        // Blocking stdin reads stay off the async workers
        tokio::task::spawn_blocking(move || ask(&conflict))
            .await
            .map_err(|e| CloudError::Fatal(format!("prompt task failed: {}", e)))?
    }
}

fn ask(conflict: &Conflict) -> Result<UserChoice> {
    println!();
    println!(
        "{}",
        format!("Resources already exist for '{}':", conflict.requested)
            .yellow()
            .bold()
    );
    for resource in &conflict.existing {
        println!(
            "  • {} {}",
            resource.kind.display_name(),
            resource.name.cyan()
        );
    }
    println!();
    println!("  1) use      reuse the existing resources");
    println!("  2) recreate delete them and deploy under a fresh name");
    println!("  3) rename   deploy under a generated name (or `rename <name>`)");
    println!("  4) abort");

    loop {
        print!("Choice [1-4]: ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            return Ok(UserChoice::Abort);
        }
        match parse_choice(&input) {
            Some(Ok(choice)) => return Ok(choice),
            Some(Err(e)) => println!("{} {}", "✗".red(), e),
            None => println!("{}", "Please answer 1, 2, 3 or 4".yellow()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice_numbers_and_words() {
        assert_eq!(parse_choice("1\n").unwrap().unwrap(), UserChoice::UseExisting);
        assert_eq!(
            parse_choice("recreate").unwrap().unwrap(),
            UserChoice::DeleteAndRecreate
        );
        assert_eq!(
            parse_choice(" 3 ").unwrap().unwrap(),
            UserChoice::RenameAndCreate(None)
        );
        assert_eq!(parse_choice("q").unwrap().unwrap(), UserChoice::Abort);
        assert!(parse_choice("maybe").is_none());
    }

    #[test]
    fn test_parse_choice_rename_with_name() {
        match parse_choice("rename my_agent_v2").unwrap().unwrap() {
            UserChoice::RenameAndCreate(Some(name)) => assert_eq!(name.as_str(), "my_agent_v2"),
            other => panic!("unexpected choice: {:?}", other),
        }
        assert!(parse_choice("rename bad name!").unwrap().is_err());
    }
}
