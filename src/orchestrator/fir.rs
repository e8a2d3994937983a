// FIR number allocation grammar: FIR-{8 hex}-{14-digit UTC timestamp}.

use rand::RngCore;

pub fn generate_fir_number() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex = hex::encode(bytes);
    let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    format!("FIR-{hex}-{timestamp}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::validation::validate_fir_number;

    #[test]
    fn generated_number_matches_grammar() {
        let number = generate_fir_number();
        assert!(validate_fir_number(&number).is_ok(), "{number} failed format check");
    }
}
