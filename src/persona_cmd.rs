//! The `house persona` subcommands.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::persona::{load_persona, load_template, read_persona, render_system_prompt, PersonaError};
use crate::situation::{Room, SituationalContext};

/// Validate the persona config and template, listing every problem.
pub fn run_persona_check(config: &Config) -> Result<()> {
    let path = &config.paths.persona_config;
    let persona_ok = match read_persona(path) {
        Ok(_) => {
            println!("persona config: ok ({})", path.display());
            true
        }
        Err(PersonaError::Invalid(problems)) => {
            println!("persona config: {} problem(s) in {}", problems.len(), path.display());
            for p in &problems {
                println!("  - {}", p);
            }
            false
        }
        Err(e) => {
            println!("persona config: {}", e);
            false
        }
    };

    let (template, warning) = load_template(&config.paths.persona_template);
    if let Some(w) = warning {
        println!("template: {}", w);
    }
    let (persona, _) = load_persona(path);
    let template_ok = match render_system_prompt(&template, &persona, None) {
        Ok(_) => {
            println!("template: renders");
            true
        }
        Err(e) => {
            println!("template: {}", e);
            false
        }
    };

    if !(persona_ok && template_ok) {
        bail!("persona check failed");
    }
    Ok(())
}

/// Print the system prompt the spirit would use for `room` right now.
pub fn run_persona_render(config: &Config, room: Room) -> Result<()> {
    let (persona, _) = load_persona(&config.paths.persona_config);
    let (template, _) = load_template(&config.paths.persona_template);
    let situation = config.persona.context_aware.then(|| {
        SituationalContext::at(
            room,
            config.persona.weather.as_str(),
            chrono::Local::now().naive_local(),
        )
        .with_season(config.persona.season.as_deref())
    });
    let prompt = render_system_prompt(&template, &persona, situation.as_ref())?;
    println!("{}", prompt);
    Ok(())
}
