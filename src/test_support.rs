//! Fixtures shared by the unit tests.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::models::{document_url, DocumentKind, NormalizedDocument};

pub const PUBLICATION_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Publication xmlns:dc="http://purl.org/dc/elements/1.1/" ID="F14929" type="Fiche Question-réponse">
  <dc:title>Passeport biométrique</dc:title>
  <dc:description>Comment obtenir un passeport ?</dc:description>
  <dc:subject>Papiers - Citoyenneté</dc:subject>
  <dc:date>modified 2024-03-01</dc:date>
  <Audience>Particuliers</Audience>
  <FilDAriane>
    <Niveau ID="Particuliers" type="Accueil">Accueil particuliers</Niveau>
    <Niveau ID="N19810" type="Thème">Papiers - Citoyenneté</Niveau>
    <Niveau ID="N19811" type="Sous-thème">Identité</Niveau>
    <Niveau ID="N360" type="Dossier">Passeport</Niveau>
  </FilDAriane>
  <Texte>
    <Paragraphe>La demande se fait dans une mairie équipée d'une station biométrique.</Paragraphe>
    <Chapitre>
      <Titre><Paragraphe>Pièces à fournir</Paragraphe></Titre>
      <Paragraphe>Voir <LienInterne LienPublication="F1342" type="Fiche d'information">la liste des pièces</LienInterne>.</Paragraphe>
      <Paragraphe>Voir aussi <LienInterne LienPublication="F1342">la fiche</LienInterne> et <LienInterne LienPublication="N360">le dossier</LienInterne>.</Paragraphe>
    </Chapitre>
  </Texte>
  <ServiceEnLigne ID="R1234" type="Téléservice" URL="https://passeport.ants.gouv.fr/">
    <Titre>Pré-demande de passeport</Titre>
  </ServiceEnLigne>
  <Reference type="Texte de référence" URL="https://www.legifrance.gouv.fr/loda/id/JORFTEXT000000816121">
    <Titre>Décret n°2005-1726</Titre>
  </Reference>
</Publication>
"#;

pub const RESOURCE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Formulaire ID="R42">
  <Titre>Formulaire cerfa 12100</Titre>
  <Texte>Le cerfa 12100 sert à déclarer un changement.</Texte>
</Formulaire>
"#;

pub const HIERARCHY_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Arborescence>
  <Item type="Theme" ID="N19810">
    <Titre>Papiers - Citoyenneté</Titre>
    <Item type="Sous-theme" ID="N19811">
      <Titre>Identité</Titre>
      <Item type="Dossier" ID="N360">
        <Titre>Passeport</Titre>
        <Item type="Sous-dossier" ID="N361">
          <Titre>Passeport pour un mineur</Titre>
        </Item>
      </Item>
    </Item>
  </Item>
  <Item type="Theme" ID="N19806"/>
</Arborescence>
"#;

/// Build a ZIP archive in memory from `(name, content)` pairs.
pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Minimal document with a searchable title.
pub fn sample_document(id: &str, title: &str) -> NormalizedDocument {
    let kind = DocumentKind::from_id(id);
    NormalizedDocument {
        id: id.to_string(),
        kind,
        title: title.to_string(),
        description: None,
        subject: None,
        audience: Some("Particuliers".to_string()),
        url: document_url(id, kind),
        theme_id: Some("N19810".to_string()),
        theme_title: Some("Papiers - Citoyenneté".to_string()),
        subtheme: None,
        folder_id: None,
        folder_title: None,
        full_text: format!("{} texte intégral", title),
        legal_references: Vec::new(),
        online_services: Vec::new(),
        internal_links: Vec::new(),
        last_modified: None,
    }
}

/// Publication XML for a numbered fact sheet.
pub fn numbered_publication(n: usize) -> String {
    format!(
        r#"<Publication><dc:title>Fiche numéro {n}</dc:title><Texte>Contenu {n}</Texte></Publication>"#
    )
}
