use anyhow::Result;

use crate::config::Config;
use crate::models::ProviderKind;

fn key_status(key: Option<String>, env_var: &str) -> String {
    match key {
        Some(_) => "OK".to_string(),
        None => format!("NO KEY (set {})", env_var),
    }
}

/// Print each catalog provider and media source with whether it can run.
pub fn list_sources(config: &Config) -> Result<()> {
    let selected = config.pipeline.provider_kinds()?;
    let providers = &config.providers;

    println!("{:<16} {:<34} SELECTED", "PROVIDER", "STATUS");
    for kind in ProviderKind::ALL {
        let status = match kind {
            ProviderKind::Wger => {
                if providers.wger.enabled {
                    "OK".to_string()
                } else {
                    "DISABLED".to_string()
                }
            }
            ProviderKind::ExerciseDb => key_status(
                providers.exercisedb.resolved_key(),
                &providers.exercisedb.api_key_env,
            ),
            ProviderKind::ApiNinjas => {
                key_status(providers.ninjas.resolved_key(), &providers.ninjas.api_key_env)
            }
        };
        println!("{:<16} {:<34} {}", kind, status, selected.contains(&kind));
    }

    println!();
    println!("{:<16} {:<34} ENRICH", "MEDIA", "STATUS");
    let media = &config.media;
    let youtube = key_status(media.youtube.resolved_key(), &media.youtube.api_key_env);
    let giphy = key_status(media.giphy.resolved_key(), &media.giphy.api_key_env);
    println!("{:<16} {:<34} {}", "youtube", youtube, config.pipeline.enrich);
    println!("{:<16} {:<34} {}", "giphy", giphy, config.pipeline.enrich);

    Ok(())
}
