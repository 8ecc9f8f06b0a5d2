use crate::itinerary::Itinerary;

pub const PLANNER_SYSTEM_PROMPT: &str = "You are an expert event planner and travel agent. \
Your goal is to help users plan an itinerary around a specific event.

IMPORTANT FLOW:
1. When a user sends a message, first determine if they are mentioning an event, artist, team, or concert.
2. If it's just a greeting or general conversation, respond normally WITHOUT mentioning events.
3. If you detect a potential event, artist or team name, ASK THE USER TO CONFIRM before searching.
4. When the user CONFIRMS they want to search for an event, include this EXACT format in your response:
   [SEARCH_EVENT: artist or event name]
5. AFTER the user selects an event (you'll see a message like \"I want to attend: Event Name at Venue...\"),
   ask ONE thing at a time in this order.
   STEP A - Ask about HOTELS first and include [ASK_HOTELS] in that message.
   When the user gives hotel preferences, trigger:
   [FIND_PLACES: type=hotel | budget=X | rating=X | radius=X]
   STEP B - After a hotel is selected, ask about RESTAURANTS: near the venue or near the hotel?
   When the user gives restaurant preferences, trigger:
   [FIND_PLACES: type=restaurant | budget=X | rating=X | radius=X]
   STEP C - After a restaurant is selected, offer things to do nearby:
   [FIND_PLACES: type=explore | budget=X | rating=X | radius=X]

FORMAT for [FIND_PLACES]:
- type: hotel, restaurant or explore (one at a time)
- budget: cheap, moderate, or expensive
- rating: minimum rating 0-5
- radius: meters (800=0.5mi, 1600=1mi, 8000=5mi)

6. After they've selected places, summarize their full itinerary.

Be friendly and concise. Ask ONE question at a time. Format responses in markdown.";

const SCHEDULE_INSTRUCTIONS: &str = "Create a time-ordered schedule for the day of the event using only the items above. \
Write a short friendly overview first. Then end your reply with a fenced ```json block containing an array of objects \
with the string fields \"time\", \"activity\" and \"description\". Every \"time\" must be a wall-clock range such as \
\"5:30 PM - 7:00 PM\". Do not add anything after the closing fence.";

/// Natural-language request asking the assistant for a schedule.
pub fn schedule_request(itinerary: &Itinerary) -> String {
    format!(
        "Please build my schedule for this trip.\n\n{}\n{SCHEDULE_INSTRUCTIONS}",
        itinerary.planning_summary()
    )
}

#[cfg(test)]
mod tests {
    use super::{PLANNER_SYSTEM_PROMPT, schedule_request};
    use crate::itinerary::Itinerary;
    use crate::itinerary::tests::sample_event;

    #[test]
    fn system_prompt_documents_every_directive() {
        for token in ["[SEARCH_EVENT:", "[FIND_PLACES:", "[ASK_HOTELS]"] {
            assert!(PLANNER_SYSTEM_PROMPT.contains(token), "missing {token}");
        }
    }

    #[test]
    fn schedule_request_embeds_itinerary_and_format() {
        let mut itinerary = Itinerary::default();
        itinerary.set_main_event(sample_event("e1", None));

        let request = schedule_request(&itinerary);
        assert!(request.contains("Main event: Eras Tour at SoFi Stadium"));
        assert!(request.contains("```json"));
    }
}
