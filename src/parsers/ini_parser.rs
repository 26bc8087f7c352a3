use crate::prelude::*;
use pest::Parser;
use pest_derive::Parser;
use std::{collections::HashMap, path::Path};

pub type Ini = HashMap<String, HashMap<String, String>>;

#[derive(Parser)]
#[grammar = "parsers/pegs/ini.pest"]
pub struct IniParser;

pub fn parse_ini(content: &str) -> Result<Ini> {
    let res = IniParser::parse(Rule::file, content)?
        .next()
        .ok_or_else(|| eyre!("empty ini document"))?;
    let mut sections: Ini = HashMap::new();
    let mut current_section = String::new();
    sections.entry(current_section.clone()).or_default();
    for line in res.into_inner() {
        match line.as_rule() {
            Rule::section => {
                current_section = line
                    .into_inner()
                    .next()
                    .map(|name| name.as_str().trim().to_string())
                    .unwrap_or_default();
                sections.entry(current_section.clone()).or_default();
            }
            Rule::property => {
                let mut rules = line.into_inner();
                let (Some(name), Some(value)) = (rules.next(), rules.next()) else {
                    continue;
                };
                sections
                    .entry(current_section.clone())
                    .or_default()
                    .insert(name.as_str().to_lowercase(), value.as_str().trim().to_string());
            }
            _ => (),
        }
    }
    Ok(sections)
}

pub fn parse_ini_from_file(path: impl AsRef<Path>) -> Result<Ini> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).wrap_err_with(|| f!("can't read {path:?}"))?;
    parse_ini(&content).wrap_err_with(|| f!("can't parse {path:?}"))
}
