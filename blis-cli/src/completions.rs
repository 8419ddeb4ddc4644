//! Shell completion support for `--set` overrides
//!
//! Profile keys are discovered by walking the JSON Schema of
//! [`ProfileConfig`], so new profile fields complete without changes here.

use schemars::schema::{Schema, SchemaObject, SingleOrVec};
use schemars::{schema_for, Map};
use std::collections::BTreeSet;

use crate::config::ProfileConfig;

const SUBCOMMANDS: &str = "generate scenario calibrate schema completions help";

/// Bash completion script with `--set` key completion
pub fn generate_bash_completion(bin_name: &str) -> String {
    format!(
        r#"# Bash completion for {bin_name}
# Installation:
#   {bin_name} completions bash > ~/.local/share/bash-completion/completions/{bin_name}

_{bin_name}_complete_set_key() {{
    local keys
    keys=$({bin_name} complete-paths 2>/dev/null)
    COMPREPLY=( $(compgen -W "$keys" -- "${{COMP_WORDS[COMP_CWORD]}}") )
}}

_{bin_name}() {{
    local cur prev words cword
    _init_completion || return

    if [[ "$prev" == "--set" ]]; then
        [[ "$cur" == *"="* ]] && return 0
        _{bin_name}_complete_set_key
        local i
        for i in "${{!COMPREPLY[@]}}"; do
            COMPREPLY[$i]="${{COMPREPLY[$i]}}="
        done
        compopt -o nospace
        return 0
    fi

    case "$prev" in
        -P|--profile|--header)
            _filedir toml
            return 0
            ;;
        --data)
            _filedir csv
            return 0
            ;;
        --sim|--summary)
            _filedir json
            return 0
            ;;
        -l|--log-level)
            COMPREPLY=( $(compgen -W "trace debug info warn error" -- "$cur") )
            return 0
            ;;
    esac

    if [[ $cword -eq 1 ]]; then
        COMPREPLY=( $(compgen -W "{SUBCOMMANDS}" -- "$cur") )
        return 0
    fi

    case "${{words[1]}}" in
        generate)
            COMPREPLY=( $(compgen -W "-P --profile --set" -- "$cur") )
            ;;
        scenario)
            COMPREPLY=( $(compgen -W "bursty unfair_tenants prefix_heavy mixed_slo --rate --seed --horizon --max-requests --header --data --summary" -- "$cur") )
            ;;
        calibrate)
            COMPREPLY=( $(compgen -W "--header --data --sim --warm-up --rtt-us --bandwidth-mbps" -- "$cur") )
            ;;
        schema)
            COMPREPLY=( $(compgen -W "profile workload" -- "$cur") )
            ;;
        completions)
            COMPREPLY=( $(compgen -W "bash zsh fish" -- "$cur") )
            ;;
    esac
}}

complete -F _{bin_name} {bin_name}
"#
    )
}

/// Zsh completion script with `--set` key completion
pub fn generate_zsh_completion(bin_name: &str) -> String {
    format!(
        r#"#compdef {bin_name}
# Zsh completion for {bin_name}
# Installation:
#   {bin_name} completions zsh > ~/.zsh/completions/_{bin_name}

_{bin_name}_complete_set_keys() {{
    local -a keys
    keys=($({bin_name} complete-paths 2>/dev/null))
    _describe 'profile keys' keys -S '='
}}

_{bin_name}() {{
    local line state

    _arguments -C \
        '(-l --log-level)'{{-l,--log-level}}'[Log level]:level:(trace debug info warn error)' \
        '1: :->command' \
        '*:: :->args'

    case $state in
        command)
            local -a subcommands
            subcommands=(
                'generate:Generate a trace from a profile'
                'scenario:Generate a trace from a built-in scenario'
                'calibrate:Compare simulated and real latencies'
                'schema:Print JSON Schema'
                'completions:Generate shell completions'
            )
            _describe 'command' subcommands
            ;;
        args)
            case $line[1] in
                generate)
                    _arguments \
                        '(-P --profile)'{{-P,--profile}}'[Profile path]:file:_files -g "*.toml"' \
                        '*--set[Override profile value]:key=value:_{bin_name}_complete_set_keys'
                    ;;
                scenario)
                    _arguments '1:name:(bursty unfair_tenants prefix_heavy mixed_slo)'
                    ;;
                schema)
                    _arguments '1:target:(profile workload)'
                    ;;
                completions)
                    _arguments '1:shell:(bash zsh fish)'
                    ;;
            esac
            ;;
    esac
}}

_{bin_name} "$@"
"#
    )
}

/// All dot paths accepted by `--set`
pub fn get_config_paths() -> Vec<String> {
    let root = schema_for!(ProfileConfig);
    let mut walker = PathWalker { definitions: &root.definitions, paths: BTreeSet::new() };
    walker.object(&root.schema, "");
    walker.paths.into_iter().collect()
}

struct PathWalker<'a> {
    definitions: &'a Map<String, Schema>,
    paths: BTreeSet<String>,
}

impl PathWalker<'_> {
    fn object(&mut self, schema: &SchemaObject, prefix: &str) {
        if !prefix.is_empty() {
            self.paths.insert(prefix.to_string());
        }

        if let Some(obj) = &schema.object {
            for (name, prop) in &obj.properties {
                let path =
                    if prefix.is_empty() { name.clone() } else { format!("{prefix}.{name}") };
                self.schema(prop, &path);
            }
        }

        // Option<T> and enum variants arrive as anyOf / oneOf / allOf
        if let Some(sub) = &schema.subschemas {
            let groups = [&sub.one_of, &sub.any_of, &sub.all_of];
            for schemas in groups.into_iter().flatten() {
                for s in schemas {
                    self.schema(s, prefix);
                }
            }
        }

        if let Some(SingleOrVec::Single(item)) = schema.array.as_ref().and_then(|a| a.items.as_ref())
        {
            self.schema(item, &format!("{prefix}.0"));
        }
    }

    fn schema(&mut self, schema: &Schema, prefix: &str) {
        let Schema::Object(obj) = schema else {
            return;
        };
        match obj.reference.as_deref().and_then(|r| r.strip_prefix("#/definitions/")) {
            Some(name) => {
                if let Some(def) = self.definitions.get(name) {
                    self.schema(def, prefix);
                }
            }
            None => self.object(obj, prefix),
        }
    }
}
