
#[cfg(test)]
mod transcription_tests;
#[cfg(test)]
mod summarization_tests;
#[cfg(test)]
mod cas_tests;
