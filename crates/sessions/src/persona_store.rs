use std::collections::HashMap;
use std::path::Path;

use circle_domain::model::{Persona, PersonaDoc, TemplateDoc};
use circle_domain::{Error, Result};

/// Read-only lookup of `persona_id -> Persona`, resolved once at
/// construction time from YAML template and persona documents (§2
/// component 3, §4.1 supplement). Not a class hierarchy: all polymorphism
/// flows through `Persona` values carrying a `template_id` (§9).
#[derive(Debug, Clone)]
pub struct PersonaStore {
    personas: HashMap<String, Persona>,
    templates: HashMap<String, TemplateDoc>,
}

impl PersonaStore {
    /// Loads every `*.yaml`/`*.yml` document under `templates_dir` as a
    /// template, then every such document under `personas_dir` as a
    /// persona, resolving each persona against its named template. An
    /// unknown `template` id is a configuration error, fatal at load time.
    pub fn load(templates_dir: &Path, personas_dir: &Path) -> Result<Self> {
        let templates = load_yaml_dir::<TemplateDoc>(templates_dir)?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect::<HashMap<_, _>>();

        let persona_docs = load_yaml_dir::<PersonaDoc>(personas_dir)?;
        let mut personas = HashMap::with_capacity(persona_docs.len());
        for doc in persona_docs {
            let template = templates.get(&doc.template).ok_or_else(|| {
                Error::Config(format!(
                    "persona '{}' references unknown template '{}'",
                    doc.id, doc.template
                ))
            })?;
            personas.insert(doc.id.clone(), Persona::resolve(&doc, template));
        }

        tracing::info!(
            template_count = templates.len(),
            persona_count = personas.len(),
            "persona store loaded"
        );

        Ok(Self { personas, templates })
    }

    pub fn get(&self, persona_id: &str) -> Option<&Persona> {
        self.personas.get(persona_id)
    }

    pub fn template(&self, template_id: &str) -> Option<&TemplateDoc> {
        self.templates.get(template_id)
    }

    pub fn list_personas(&self) -> Vec<&Persona> {
        self.personas.values().collect()
    }

    pub fn list_templates(&self) -> Vec<&TemplateDoc> {
        self.templates.values().collect()
    }
}

fn load_yaml_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false);
        if !is_yaml {
            continue;
        }
        let raw = std::fs::read_to_string(&path)?;
        let doc: T = serde_yaml::from_str(&raw)?;
        out.push(doc);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn load_resolves_persona_against_named_template() {
        let tmp = tempdir();
        let templates_dir = tmp.join("templates");
        let personas_dir = tmp.join("personas");
        std::fs::create_dir_all(&templates_dir).unwrap();
        std::fs::create_dir_all(&personas_dir).unwrap();

        write_file(
            &templates_dir,
            "skeptic.yaml",
            "id: skeptic\nname: Skeptic\nepistemic_lens: doubts premises\n",
        );
        write_file(
            &personas_dir,
            "orin.yaml",
            "id: orin\nname: Orin\ntemplate: skeptic\ncolor: \"#112233\"\n",
        );

        let store = PersonaStore::load(&templates_dir, &personas_dir).unwrap();
        let persona = store.get("orin").unwrap();
        assert_eq!(persona.epistemic_lens, "doubts premises");

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn load_rejects_unknown_template_reference() {
        let tmp = tempdir();
        let templates_dir = tmp.join("templates");
        let personas_dir = tmp.join("personas");
        std::fs::create_dir_all(&templates_dir).unwrap();
        std::fs::create_dir_all(&personas_dir).unwrap();

        write_file(
            &personas_dir,
            "orin.yaml",
            "id: orin\nname: Orin\ntemplate: missing\n",
        );

        let result = PersonaStore::load(&templates_dir, &personas_dir);
        assert!(result.is_err());

        std::fs::remove_dir_all(&tmp).ok();
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("circle-persona-test-{}", uuid::Uuid::new_v4()));
        dir
    }
}
