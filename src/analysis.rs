use std::time::Duration;
use tracing::{debug, warn};

use crate::economy::CountryRecord;
use crate::gemini::{GenerateRequest, GenerationError, GenerativeService};

/// Shown when the request fails or times out
pub const ANALYSIS_FAILURE: &str = "Unable to retrieve AI analysis at this time.";
/// Shown when the model answers with no text
pub const ANALYSIS_EMPTY: &str = "Analysis unavailable.";

const SYSTEM_INSTRUCTION: &str = "You are a world-class senior economist providing brief, high-level executive summaries for a global dashboard.";
const TEMPERATURE: f32 = 0.7;

/// Prompt for a region, with known figures when the table has them
pub fn build_prompt(region_name: &str, record: Option<&CountryRecord>) -> String {
    let context = match record {
        Some(r) => format!(
            "Known data: GDP ~{}B USD, Growth: {}%.",
            r.gdp_billions_usd, r.gdp_growth_percent
        ),
        None => "Data not locally available, please estimate.".to_string(),
    };

    format!(
        "Generate a concise, real-time style economic summary for {region_name}.\n\
         {context}\n\
         Focus on:\n\
         1. Key economic drivers in 2024/2025.\n\
         2. Recent major events affecting their economy.\n\
         3. Future outlook (Positive/Negative).\n\
         \n\
         Format using Markdown. Keep it under 200 words. Use bullet points for readability."
    )
}

pub fn build_request(region_name: &str, record: Option<&CountryRecord>) -> GenerateRequest {
    GenerateRequest {
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        prompt: build_prompt(region_name, record),
        temperature: Some(TEMPERATURE),
    }
}

/// Generate the markdown summary. Never fails: errors and timeouts become
/// [`ANALYSIS_FAILURE`], an empty answer becomes [`ANALYSIS_EMPTY`].
pub async fn generate_analysis(
    service: &dyn GenerativeService,
    region_name: &str,
    record: Option<&CountryRecord>,
    timeout: Duration,
) -> String {
    let request = build_request(region_name, record);
    let outcome = match tokio::time::timeout(timeout, service.generate(&request)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(timeout)),
    };

    match outcome {
        Ok(text) if text.trim().is_empty() => {
            debug!(region = region_name, "model returned no analysis text");
            ANALYSIS_EMPTY.to_string()
        }
        Ok(text) => text,
        Err(e) => {
            warn!(region = region_name, error = %e, "analysis request failed");
            ANALYSIS_FAILURE.to_string()
        }
    }
}
