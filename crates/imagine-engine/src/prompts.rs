//! Instruction builders, one per operation.
//!
//! Every builder is a pure function of its inputs. Sections always appear in
//! the same order: task statement, mandatory constraints, avoid clause,
//! preservation rules. Empty sections are left out.

use imagine_contracts::garments::GarmentRequest;
use imagine_contracts::options::{
    render_tags, BackgroundMode, LogoStyle, MaterialTag, StyleTag, TagLabel, ViewAngle,
};
use imagine_contracts::panels::{CreatorState, EditorState};

use crate::backend::ContentPart;
use crate::data_uri::{declared_mime_type, strip_data_uri_prefix, DEFAULT_MIME_TYPE};

pub const ANALYSIS_DELIMITER: &str = "---SPLIT---";
pub const REFERENCE_EXACT: &str = "use the attached reference exactly";
pub const PLAUSIBLE_REPLACEMENT: &str = "generate a plausible modern replacement";

const NEUTRAL_BACKGROUND: &str = "Neutral, solid color, clean, no details, studio";

/// An image sent alongside the instruction, optionally introduced by a
/// short text label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub label: Option<String>,
    /// Data URI or bare base64.
    pub image: String,
}

impl Attachment {
    fn unlabeled(image: &str) -> Self {
        Self {
            label: None,
            image: image.to_string(),
        }
    }

    fn labeled(label: String, image: &str) -> Self {
        Self {
            label: Some(label),
            image: image.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl AssembledPrompt {
    /// Wire parts: the instruction first, then each attachment preceded by
    /// its label. Image bodies are sent without their data-URI header.
    pub fn to_parts(&self) -> Vec<ContentPart> {
        let mut parts = vec![ContentPart::text(self.text.clone())];
        for attachment in &self.attachments {
            if let Some(label) = attachment.label.as_ref() {
                parts.push(ContentPart::text(label.clone()));
            }
            parts.push(ContentPart::InlineImage {
                mime_type: declared_mime_type(&attachment.image)
                    .unwrap_or(DEFAULT_MIME_TYPE)
                    .to_string(),
                data: strip_data_uri_prefix(&attachment.image).to_string(),
            });
        }
        parts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationFields {
    pub prompt: String,
    pub neg_prompt: String,
    pub view: ViewAngle,
    pub styles: Vec<StyleTag>,
    pub logo_styles: Vec<LogoStyle>,
    pub materials: Vec<MaterialTag>,
    pub background: BackgroundMode,
    pub ref_image: Option<String>,
    pub pose_image: Option<String>,
    pub style_influence: f32,
    pub pose_influence: f32,
}

impl From<&CreatorState> for GenerationFields {
    fn from(state: &CreatorState) -> Self {
        Self {
            prompt: state.prompt.clone(),
            neg_prompt: state.neg_prompt.clone(),
            view: state.view.clone(),
            styles: state.styles.clone(),
            logo_styles: state.logo_styles.clone(),
            materials: state.materials.clone(),
            background: state.background.clone(),
            ref_image: state.ref_image.clone(),
            pose_image: state.pose_image.clone(),
            style_influence: state.style_influence,
            pose_influence: state.pose_influence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditFields {
    pub prompt: String,
    pub neg_prompt: String,
    pub view: ViewAngle,
    pub styles: Vec<StyleTag>,
    pub materials: Vec<MaterialTag>,
}

impl From<&EditorState> for EditFields {
    fn from(state: &EditorState) -> Self {
        Self {
            prompt: state.prompt.clone(),
            neg_prompt: state.neg_prompt.clone(),
            view: state.view.clone(),
            styles: state.styles.clone(),
            materials: state.materials.clone(),
        }
    }
}

/// The task statement of a generation, which is also what the history
/// records as the image's prompt.
pub fn generation_task(view: &ViewAngle, prompt: &str) -> String {
    let prompt = prompt.trim().trim_end_matches('.');
    format!("Mandatory view: {}. {prompt}.", view_label(view))
}

pub fn generation_prompt(fields: &GenerationFields) -> AssembledPrompt {
    let background = match &fields.background {
        BackgroundMode::Descriptive(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => NEUTRAL_BACKGROUND.to_string(),
    };
    let mut constraints = vec![format!("Background: {background}.")];
    let styles = style_list(&fields.styles, &fields.logo_styles);
    if !styles.is_empty() {
        constraints.push(format!("Applied styles: {styles}."));
    }
    let materials = render_tags(&fields.materials);
    if !materials.is_empty() {
        constraints.push(format!("Materials/textures: {materials}."));
    }
    constraints.push(format!("View: {}.", view_label(&fields.view)));

    let text = join_sections(&[
        generation_task(&fields.view, &fields.prompt),
        constraint_block("MANDATORY GUIDELINES (HIGHEST PRIORITY):", &constraints),
        avoid_clause(&fields.neg_prompt),
    ]);

    let mut attachments = Vec::new();
    if let Some(reference) = non_blank(fields.ref_image.as_deref()) {
        attachments.push(Attachment::labeled(
            format!(
                "Visual/style reference (influence: {}):",
                fields.style_influence
            ),
            reference,
        ));
    }
    if let Some(pose) = non_blank(fields.pose_image.as_deref()) {
        attachments.push(Attachment::labeled(
            format!(
                "Structural pose reference (influence: {}):",
                fields.pose_influence
            ),
            pose,
        ));
    }
    AssembledPrompt { text, attachments }
}

pub fn analysis_prompt(image: &str) -> AssembledPrompt {
    let text = format!(
        "Analyze this image for prompt creation. Return EXACTLY this format, separated by '{ANALYSIS_DELIMITER}':\n\
         [Detailed visual description and style]\n\
         {ANALYSIS_DELIMITER}\n\
         [What to avoid, defects or negative elements]"
    );
    AssembledPrompt {
        text,
        attachments: vec![Attachment::unlabeled(image)],
    }
}

/// Inpainting when a mask is given, otherwise a whole-image edit.
pub fn edit_prompt(fields: &EditFields, image: &str, mask: Option<&str>) -> AssembledPrompt {
    let mask = non_blank(mask);
    let request = fields.prompt.trim();
    let task = if mask.is_some() {
        format!(
            "LOCAL EDIT TASK (INPAINTING).\n\
             Use the second image as the MASK (painted area = where to edit).\n\
             Requested change: \"{request}\"."
        )
    } else {
        format!("Edit the image while keeping its original structure.\nInstruction: \"{request}\".")
    };

    let mut constraints = Vec::new();
    let styles = render_tags(&fields.styles);
    if !styles.is_empty() {
        constraints.push(format!("Desired visual style: {styles}."));
    }
    let materials = render_tags(&fields.materials);
    if !materials.is_empty() {
        constraints.push(format!("Materials: {materials}."));
    }
    constraints.push(format!("View: {}.", view_label(&fields.view)));

    let preservation = if mask.is_some() {
        constraint_block(
            "STRICT PRESERVATION RULES:",
            &[
                "The area outside the mask (transparent) must remain 100% IDENTICAL to the original image. Do not change pixels outside the mask.".to_string(),
                "The edited area must blend seamlessly with the style, lighting, noise and texture of the original image.".to_string(),
            ],
        )
    } else {
        constraint_block(
            "PRESERVATION RULES:",
            &["Preserve composition, identity and visual style wherever not specified otherwise.".to_string()],
        )
    };

    let text = join_sections(&[
        task,
        constraint_block("STYLE CONTEXT:", &constraints),
        avoid_clause(&fields.neg_prompt),
        preservation,
    ]);

    let mut attachments = vec![Attachment::unlabeled(image)];
    if let Some(mask) = mask {
        attachments.push(Attachment::unlabeled(mask));
    }
    AssembledPrompt { text, attachments }
}

/// One replacement clause per garment, in the given order.
pub fn swap_prompt(image: &str, garments: &[GarmentRequest]) -> AssembledPrompt {
    let changes = garments
        .iter()
        .map(|garment| {
            let has_reference = non_blank(garment.ref_image.as_deref()).is_some();
            let description = garment.description.trim();
            let replacement = if !description.is_empty() {
                description
            } else if has_reference {
                REFERENCE_EXACT
            } else {
                PLAUSIBLE_REPLACEMENT
            };
            let marker = if has_reference {
                " (USE THE ATTACHED VISUAL REFERENCE)"
            } else {
                ""
            };
            format!(
                "Replace the {} region with: {replacement}{marker}",
                garment.region
            )
        })
        .collect::<Vec<_>>();

    let text = join_sections(&[
        "MODE: STRUCTURAL FASHION EDIT (VIRTUAL TRY-ON).\n\
         TASK: Apply the clothing changes listed below to the person in the main photo."
            .to_string(),
        constraint_block("PRIORITY CHANGES:", &changes),
        constraint_block(
            "MANDATORY EXECUTION RULES:",
            &[
                "ABSOLUTE INTEGRITY: face, hair, pose, background and lighting MUST remain identical.".to_string(),
                "SEAMLESS BLEND: the new clothing must match the grain, focus, resolution and light direction of the original photo.".to_string(),
            ],
        ),
    ]);

    let mut attachments = vec![Attachment::unlabeled(image)];
    for garment in garments {
        if let Some(reference) = non_blank(garment.ref_image.as_deref()) {
            attachments.push(Attachment::labeled(
                format!(
                    "Visual reference for ({}) - copy style and design:",
                    garment.region
                ),
                reference,
            ));
        }
    }
    AssembledPrompt { text, attachments }
}

/// Style labels followed by logo sub-styles, which only count when the
/// logo style itself is selected.
fn style_list(styles: &[StyleTag], logo_styles: &[LogoStyle]) -> String {
    let mut labels = styles
        .iter()
        .filter_map(TagLabel::label)
        .collect::<Vec<&str>>();
    if styles.contains(&StyleTag::Logo) {
        labels.extend(logo_styles.iter().filter_map(TagLabel::label));
    }
    labels.join(", ")
}

fn view_label(view: &ViewAngle) -> &str {
    view.label().unwrap_or("Frontal")
}

fn constraint_block(heading: &str, lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut block = heading.to_string();
    for (idx, line) in lines.iter().enumerate() {
        block.push_str(&format!("\n{}. {line}", idx + 1));
    }
    block
}

fn avoid_clause(neg_prompt: &str) -> String {
    let trimmed = neg_prompt.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!("AVOID: {trimmed}")
}

fn join_sections(sections: &[String]) -> String {
    sections
        .iter()
        .map(|section| section.trim())
        .filter(|section| !section.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}
